//! Run events and the progress feed consumed by the presentation layer.
//!
//! Every state change of a run is recorded as an immutable [`Event`] on the
//! run's log. The same changes are forwarded to subscribers as [`RunEvent`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::ReasoningStep;

/// A single entry in a run's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (no file content)
    pub payload_summary: String,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(run_id: Uuid, event_type: EventType, payload_summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            event_type,
            payload_summary: payload_summary.into(),
            error: None,
        }
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    /// The progress update this event implies for the UI
    pub fn progress(&self) -> ProgressUpdate {
        ProgressUpdate {
            stage: self.event_type.stage(),
            message: self.payload_summary.clone(),
        }
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Batch submitted, file processing started
    RunStarted,

    /// Every file validated, extracted and encoded
    BatchProcessed,

    /// Phase 1 request issued
    ExtractionStarted,

    /// Phase 1 produced claims for a file
    FileExtracted,

    /// Phase 1 yielded nothing usable for a file (non-fatal)
    FileExtractionFailed,

    /// Phase 2 request issued
    ReasoningStarted,

    /// Phase 2 emitted a reasoning step
    ReasoningStep,

    /// The run reached `Complete`
    RunCompleted,

    /// The run reached `Failed`
    RunFailed,
}

impl EventType {
    pub fn stage(&self) -> Stage {
        match self {
            Self::RunStarted | Self::BatchProcessed => Stage::Uploading,
            Self::ExtractionStarted | Self::FileExtracted | Self::FileExtractionFailed => {
                Stage::Extracting
            }
            Self::ReasoningStarted | Self::ReasoningStep => Stage::Reasoning,
            Self::RunCompleted => Stage::Complete,
            Self::RunFailed => Stage::Failed,
        }
    }
}

/// Coarse pipeline progress, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploading,
    Extracting,
    Reasoning,
    Complete,
    Failed,
}

/// Stage plus a free-text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub message: String,
}

/// What a run subscriber receives, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    Progress(ProgressUpdate),
    Step(ReasoningStep),
}
