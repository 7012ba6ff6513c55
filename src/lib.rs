//! evidence-lens - Two-phase forensic evidence analysis
//!
//! Ingests heterogeneous evidence files (documents, images, audio, video),
//! extracts per-file forensic metadata, and reconciles the claims of every
//! file through a remote reasoning model into a timeline, a list of
//! cross-source contradictions and a verdict.
//!
//! # Architecture
//!
//! ```text
//! EvidenceInput ─▶ EvidenceBatchProcessor ─▶ Phase 1 (extraction) ─▶ Phase 2 (reasoning) ─▶ AnalysisResult
//!                  validate/extract/encode     claims per file          timeline, contradictions
//! ```
//!
//! Every run moves through `Idle → Processing → Extracting → Reasoning →
//! Complete`, or ends in `Failed` with the phase and cause attached. Only
//! one run is active at a time; submitting a new batch discards the old one.
//!
//! # Modules
//!
//! - `adapters`: The remote reasoning interface (Gemini, fixture)
//! - `config`: YAML configuration and discovery
//! - `core`: Orchestrator, both phases, normalization helpers
//! - `domain`: Data structures (EvidenceFile, AnalysisResult, Run, Event)
//! - `error`: Error taxonomy
//! - `ingest`: Validation, metadata extraction, encoding, batching
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use evidence_lens::{AnalysisOrchestrator, AnalyzerConfig, EvidenceInput, GeminiBackend};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = AnalyzerConfig::default();
//! let backend = GeminiBackend::from_env(config.remote.clone())?;
//! let orchestrator = AnalysisOrchestrator::new(Arc::new(backend), config);
//!
//! let run = orchestrator
//!     .run(vec![
//!         EvidenceInput::from_path("case/email.pdf", "application/pdf"),
//!         EvidenceInput::from_path("case/access_log.png", "image/png"),
//!     ])
//!     .await?;
//! println!("{:?}", run.state);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use adapters::{FixtureBackend, GeminiBackend, ReasoningBackend};
pub use config::AnalyzerConfig;
pub use core::{AnalysisOrchestrator, RunHandle};
pub use domain::{AnalysisResult, EvidenceInput, Run, RunEvent, RunState};
pub use error::PipelineError;
pub use ingest::{BatchResult, EvidenceBatchProcessor};
