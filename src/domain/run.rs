//! Run state machine.
//!
//! A Run is one pass of a batch through the pipeline:
//!
//! ```text
//! Idle → Processing → Extracting → Reasoning → Complete
//!            ↘            ↘            ↘
//!                       Failed
//! ```
//!
//! `Complete` and `Failed` are terminal. A new submission starts a new Run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::analysis::AnalysisResult;
use super::events::{Event, EventType};
use super::evidence::ProcessingSummary;
use super::extraction::ExtractionOutput;
use crate::error::{FileError, PipelineError};

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Created, nothing submitted yet
    Idle,

    /// Validating, extracting metadata and encoding files
    Processing,

    /// Phase 1 in flight
    Extracting,

    /// Phase 2 in flight
    Reasoning,

    /// Finished with a validated result
    Complete,

    /// Aborted with the phase that failed
    Failed { phase: FailedPhase, cause: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Idle, Processing)
            | (Processing, Extracting)
            | (Extracting, Reasoning)
            | (Reasoning, Complete) => true,
            (Processing | Extracting | Reasoning, Failed { .. }) => true,
            _ => false,
        }
    }

    fn event_type(&self) -> EventType {
        match self {
            Self::Idle | Self::Processing => EventType::RunStarted,
            Self::Extracting => EventType::ExtractionStarted,
            Self::Reasoning => EventType::ReasoningStarted,
            Self::Complete => EventType::RunCompleted,
            Self::Failed { .. } => EventType::RunFailed,
        }
    }
}

/// Phase in which a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedPhase {
    Processing,
    Extraction,
    Reasoning,
}

impl FailedPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Extraction => "extraction",
            Self::Reasoning => "reasoning",
        }
    }
}

/// Category of a run-fatal error, so callers can decide what to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BatchIncomplete,
    RemoteProtocol,
    RemoteTransport,
}

/// Everything a caller needs to report or retry a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub phase: FailedPhase,
    pub kind: FailureKind,
    pub cause: String,

    /// Per-file errors when the batch was incomplete
    pub file_errors: Vec<FileError>,

    /// Whatever Phase 1 produced before the failure
    pub partial_extraction: Option<ExtractionOutput>,
}

impl RunFailure {
    pub fn from_error(
        phase: FailedPhase,
        error: &PipelineError,
        partial_extraction: Option<ExtractionOutput>,
    ) -> Self {
        let (kind, file_errors) = match error {
            PipelineError::BatchIncomplete(e) => (FailureKind::BatchIncomplete, e.errors.clone()),
            PipelineError::RemoteTransport(_) => (FailureKind::RemoteTransport, Vec::new()),
            _ => (FailureKind::RemoteProtocol, Vec::new()),
        };

        Self {
            phase,
            kind,
            cause: error.to_string(),
            file_errors,
            partial_extraction,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::RemoteTransport
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid run transition: {from:?} → {to:?}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// One pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Current state of the run
    pub state: RunState,

    /// When the run was created
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of files submitted
    pub file_count: usize,

    /// Batch processing statistics
    pub batch: Option<ProcessingSummary>,

    /// Phase 1 output, once available
    pub extraction: Option<ExtractionOutput>,

    /// Final result; only present in `Complete`
    pub result: Option<AnalysisResult>,

    /// Failure details; only present in `Failed`
    pub failure: Option<RunFailure>,

    /// Ordered log of everything that happened
    pub events: Vec<Event>,
}

impl Run {
    /// Create a new idle run
    pub fn new(id: Uuid, file_count: usize) -> Self {
        Self {
            id,
            state: RunState::Idle,
            started_at: Utc::now(),
            completed_at: None,
            file_count,
            batch: None,
            extraction: None,
            result: None,
            failure: None,
            events: Vec::new(),
        }
    }

    /// Move to `next`, logging the change. Returns the logged event.
    pub fn advance(
        &mut self,
        next: RunState,
        summary: impl Into<String>,
    ) -> Result<Event, TransitionError> {
        if !self.state.can_transition_to(&next) {
            return Err(TransitionError {
                from: self.state.clone(),
                to: next,
            });
        }

        let mut event = Event::new(self.id, next.event_type(), summary);
        if let RunState::Failed { cause, .. } = &next {
            event = event.with_error(cause.clone());
        }
        if next.is_terminal() {
            self.completed_at = Some(event.timestamp);
        }

        self.state = next;
        self.events.push(event.clone());
        Ok(event)
    }

    /// Log an event that does not change state
    pub fn record(&mut self, event_type: EventType, summary: impl Into<String>) -> Event {
        let event = Event::new(self.id, event_type, summary);
        self.events.push(event.clone());
        event
    }

    /// Enter `Complete` with a validated result
    pub fn complete(&mut self, result: AnalysisResult) -> Result<Event, TransitionError> {
        let summary = format!(
            "Analysis complete: {} timeline events, {} contradictions",
            result.timeline.len(),
            result.contradictions.len()
        );
        let event = self.advance(RunState::Complete, summary)?;
        self.result = Some(result);
        Ok(event)
    }

    /// Enter `Failed` with failure details
    pub fn fail(&mut self, failure: RunFailure) -> Result<Event, TransitionError> {
        let next = RunState::Failed {
            phase: failure.phase,
            cause: failure.cause.clone(),
        };
        let summary = format!("{} failed: {}", failure.phase.as_str(), failure.cause);
        let event = self.advance(next, summary)?;
        self.failure = Some(failure);
        Ok(event)
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        !matches!(self.state, RunState::Idle) && !self.is_finished()
    }

    /// Check if the run has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// The phase that failed, if any
    pub fn failed_phase(&self) -> Option<FailedPhase> {
        match self.state {
            RunState::Failed { phase, .. } => Some(phase),
            _ => None,
        }
    }
}
