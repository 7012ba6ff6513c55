//! Domain types for the evidence pipeline.
//!
//! This module contains the core data structures:
//! - Evidence: submitted inputs and processed files
//! - Extraction: Phase 1 claims per file
//! - Analysis: the reconciled result model
//! - Run: pipeline state machine and its event log

pub mod analysis;
pub mod events;
pub mod evidence;
pub mod extraction;
pub mod run;

// Re-export commonly used types
pub use analysis::{
    AnalysisResult, Claim, ConfidenceLevel, ConfidenceScores, Contradiction, ContradictionClaim,
    Credibility, EventTime, ModelError, ReasoningStep, Severity, TamperingIndicator, TimelineEvent,
    ToolCall,
};
pub use events::{Event, EventType, ProgressUpdate, RunEvent, Stage};
pub use evidence::{
    Category, ContentBlock, EvidenceFile, EvidenceInput, EvidenceSource, FileStatus, MetadataMap,
    ProcessingSummary,
};
pub use extraction::{ExtractionOutput, FileExtraction};
pub use run::{FailedPhase, FailureKind, Run, RunFailure, RunState, TransitionError};
