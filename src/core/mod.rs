//! Core analysis logic.
//!
//! This module contains:
//! - Orchestrator: run state machine, cancellation and event feed
//! - Extraction / Reasoning: the two remote phases
//! - Json, Steps, Timeline: normalization of remote answers
//! - Credibility: the per-run source ranking table
//! - Retry: backoff for transport failures

pub mod credibility;
pub mod extraction;
pub mod json;
pub mod orchestrator;
pub mod reasoning;
pub mod retry;
pub mod steps;
pub mod timeline;

// Re-export commonly used types
pub use credibility::{CredibilityPolicy, CredibilityRule};
pub use json::locate_json;
pub use orchestrator::{AnalysisOrchestrator, RunHandle};
pub use retry::{with_retry, RetryPolicy};
pub use steps::{number_steps, split_steps};
pub use timeline::order_timeline;
