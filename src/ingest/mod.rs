//! Evidence ingestion.
//!
//! Turns raw submitted files into processed [`EvidenceFile`]s:
//!
//! ```text
//! EvidenceInput → FileValidator → MetadataExtractor → PayloadEncoder
//!                         (one task per file)
//!                               ↓
//!                 EvidenceBatchProcessor → BatchResult
//! ```
//!
//! [`EvidenceFile`]: crate::domain::EvidenceFile

pub mod batch;
pub mod metadata;
pub mod payload;
pub mod validator;

// Re-export key types
pub use batch::{BatchResult, EvidenceBatchProcessor};
pub use metadata::{extract, ExtractionOutcome, FileFacts, MetadataExtractor};
pub use payload::{fingerprint, EvidencePayload, MetadataSummary, PayloadEncoder, PayloadPart};
pub use validator::{FileDescriptor, FileLimits, FileValidator};
