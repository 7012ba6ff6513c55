//! Analysis orchestrator.
//!
//! Drives one run through batch processing, Phase 1 and Phase 2, logging
//! every state change on the run and forwarding it to the run's subscriber.
//!
//! Exactly one run is active at a time. Submitting a batch replaces the
//! current run handle atomically and aborts the previous task; a run that
//! finds itself replaced after any suspension point stops without applying
//! what it received.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{ReasoningBackend, RemotePhase};
use crate::config::AnalyzerConfig;
use crate::domain::analysis::AnalysisResult;
use crate::domain::events::{Event, EventType, RunEvent};
use crate::domain::evidence::EvidenceInput;
use crate::domain::extraction::ExtractionOutput;
use crate::domain::run::{FailedPhase, Run, RunFailure, RunState};
use crate::error::{PipelineError, RemoteProtocolError};
use crate::ingest::batch::EvidenceBatchProcessor;
use crate::ingest::payload::EvidencePayload;

use super::retry::with_retry;
use super::{extraction, reasoning};

struct ActiveRun {
    id: Uuid,
    abort: AbortHandle,
}

/// The only shared mutable state: which run is current
#[derive(Default)]
struct RunSlot {
    current: Mutex<Option<ActiveRun>>,
}

impl RunSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.lock().as_ref().is_some_and(|run| run.id == id)
    }

    fn current_id(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|run| run.id)
    }

    /// Clear the slot if `id` still holds it
    fn release(&self, id: Uuid) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|run| run.id == id) {
            *current = None;
        }
    }

    fn cancel(&self) -> Option<Uuid> {
        let previous = self.lock().take()?;
        previous.abort.abort();
        Some(previous.id)
    }
}

/// A submitted run: its progress feed and its eventual outcome
pub struct RunHandle {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<RunEvent>,
    task: JoinHandle<Result<Run, PipelineError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next progress update or reasoning step; `None` once the run is over
    /// and every event has been received
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Wait for the run to finish.
    ///
    /// Returns the run in `Complete` or `Failed`, or `Superseded` if it was
    /// cancelled or replaced before finishing.
    pub async fn wait(self) -> Result<Run, PipelineError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(PipelineError::Superseded { run_id: self.run_id }),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

/// Everything one run needs, detached from the orchestrator
struct RunContext {
    id: Uuid,
    backend: Arc<dyn ReasoningBackend>,
    config: Arc<AnalyzerConfig>,
    slot: Arc<RunSlot>,
    events: mpsc::UnboundedSender<RunEvent>,
}

/// Drives evidence batches through the two-phase analysis
pub struct AnalysisOrchestrator {
    backend: Arc<dyn ReasoningBackend>,
    config: Arc<AnalyzerConfig>,
    slot: Arc<RunSlot>,
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: AnalyzerConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            slot: Arc::new(RunSlot::default()),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The run currently in flight, if any
    pub fn current_run_id(&self) -> Option<Uuid> {
        self.slot.current_id()
    }

    /// Start a run over `files`, replacing any run in flight.
    ///
    /// Refuses batches below the configured minimum before anything starts.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, files: Vec<EvidenceInput>) -> Result<RunHandle, PipelineError> {
        let minimum = self.config.limits.min_files;
        if files.len() < minimum {
            return Err(PipelineError::TooFewFiles {
                count: files.len(),
                minimum,
            });
        }

        Ok(self.spawn(|ctx| async move { ctx.execute(files).await }))
    }

    /// Submit and wait for the outcome
    pub async fn run(&self, files: Vec<EvidenceInput>) -> Result<Run, PipelineError> {
        self.submit(files)?.wait().await
    }

    /// Start a run at Phase 2 from a previously retrieved extraction, such
    /// as the partial output of a run that failed in reasoning
    pub fn resume_reasoning(&self, extraction: ExtractionOutput) -> Result<RunHandle, PipelineError> {
        if !extraction.has_claims() {
            return Err(PipelineError::NoClaims);
        }

        Ok(self.spawn(|ctx| async move { ctx.resume(extraction).await }))
    }

    /// Abort the run in flight without starting another
    pub fn cancel(&self) -> Option<Uuid> {
        let cancelled = self.slot.cancel();
        if let Some(run_id) = cancelled {
            info!(%run_id, "Run cancelled");
        }
        cancelled
    }

    fn spawn<F, Fut>(&self, body: F) -> RunHandle
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: std::future::Future<Output = Result<Run, PipelineError>> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = RunContext {
            id: run_id,
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            slot: Arc::clone(&self.slot),
            events: tx,
        };

        let slot = Arc::clone(&self.slot);
        let work = body(ctx);

        // Hold the slot while spawning so the new task never observes the
        // previous run as current
        let mut current = self.slot.lock();
        let task = tokio::spawn(async move {
            let outcome = work.await;
            slot.release(run_id);
            outcome
        });
        if let Some(previous) = current.replace(ActiveRun {
            id: run_id,
            abort: task.abort_handle(),
        }) {
            previous.abort.abort();
            info!(superseded = %previous.id, %run_id, "Previous run superseded");
        }
        drop(current);

        RunHandle {
            run_id,
            events: rx,
            task,
        }
    }
}

impl RunContext {
    /// Stop if a newer submission replaced this run
    fn ensure_current(&self) -> Result<(), PipelineError> {
        if self.slot.is_current(self.id) {
            Ok(())
        } else {
            warn!(run_id = %self.id, "Run superseded, discarding its output");
            Err(PipelineError::Superseded { run_id: self.id })
        }
    }

    fn publish(&self, event: &Event) {
        // A subscriber that went away does not stop the run
        let _ = self.events.send(RunEvent::Progress(event.progress()));
    }

    fn advance(&self, run: &mut Run, next: RunState, summary: impl Into<String>) -> Result<(), PipelineError> {
        let event = run.advance(next, summary)?;
        self.publish(&event);
        Ok(())
    }

    fn record(&self, run: &mut Run, event_type: EventType, summary: impl Into<String>) {
        let event = run.record(event_type, summary);
        self.publish(&event);
    }

    fn fail(
        &self,
        mut run: Run,
        phase: FailedPhase,
        error: PipelineError,
        partial: Option<ExtractionOutput>,
    ) -> Result<Run, PipelineError> {
        error!(run_id = %self.id, phase = phase.as_str(), error = %error, "Run failed");
        let event = run.fail(RunFailure::from_error(phase, &error, partial))?;
        self.publish(&event);
        Ok(run)
    }

    #[instrument(skip_all, fields(run_id = %self.id, files = inputs.len()))]
    async fn execute(self, inputs: Vec<EvidenceInput>) -> Result<Run, PipelineError> {
        let mut run = Run::new(self.id, inputs.len());
        info!("Starting analysis run");

        self.advance(&mut run, RunState::Processing, format!("Processing {} files", inputs.len()))?;

        let processor = EvidenceBatchProcessor::new(self.config.limits);
        let batch = processor.process(inputs).await;
        self.ensure_current()?;

        let summary = batch.summary();
        self.record(
            &mut run,
            EventType::BatchProcessed,
            format!(
                "{} of {} files ready ({:.1} MB, metadata for {:.0}%)",
                summary.successful,
                summary.total,
                summary.total_megabytes(),
                summary.metadata_percentage
            ),
        );
        run.batch = Some(summary);

        if let Some(incomplete) = batch.incomplete_error() {
            return self.fail(run, FailedPhase::Processing, incomplete.into(), None);
        }

        let payload = batch.payload();
        self.advance(
            &mut run,
            RunState::Extracting,
            format!("Extracting claims from {} files", payload.len()),
        )?;

        let extraction = match self.extract(&payload).await {
            Ok(extraction) => extraction,
            Err(PipelineError::Superseded { run_id }) => return Err(PipelineError::Superseded { run_id }),
            Err(e) => return self.fail(run, FailedPhase::Extraction, e, None),
        };

        for file in &extraction.files {
            self.record(
                &mut run,
                EventType::FileExtracted,
                format!("{}: {} claims", file.file_name, file.claims.len()),
            );
        }
        for name in &extraction.failed_files {
            self.record(&mut run, EventType::FileExtractionFailed, format!("{}: no claims extracted", name));
        }
        run.extraction = Some(extraction.clone());

        if !extraction.has_claims() {
            let error = RemoteProtocolError::new(
                RemotePhase::Extraction.as_str(),
                "no claims extracted from any file",
            );
            return self.fail(run, FailedPhase::Extraction, error.into(), Some(extraction));
        }

        self.reason_and_finish(run, extraction).await
    }

    #[instrument(skip_all, fields(run_id = %self.id, files = extraction.files.len()))]
    async fn resume(self, extraction: ExtractionOutput) -> Result<Run, PipelineError> {
        let file_count = extraction.files.len() + extraction.failed_files.len();
        let mut run = Run::new(self.id, file_count);
        info!("Resuming analysis at reasoning");

        self.advance(&mut run, RunState::Processing, "Restored from a previous extraction")?;
        self.advance(
            &mut run,
            RunState::Extracting,
            format!("Restored claims for {} files", extraction.files.len()),
        )?;
        run.extraction = Some(extraction.clone());

        self.reason_and_finish(run, extraction).await
    }

    async fn reason_and_finish(&self, mut run: Run, extraction: ExtractionOutput) -> Result<Run, PipelineError> {
        self.advance(
            &mut run,
            RunState::Reasoning,
            format!("Reconciling {} claims across sources", extraction.claim_count()),
        )?;

        let result = match self.reason(&extraction).await {
            Ok(result) => result,
            Err(PipelineError::Superseded { run_id }) => return Err(PipelineError::Superseded { run_id }),
            Err(e) => return self.fail(run, FailedPhase::Reasoning, e, Some(extraction)),
        };

        for step in &result.reasoning_steps {
            run.record(EventType::ReasoningStep, step.text.clone());
            let _ = self.events.send(RunEvent::Step(step.clone()));
        }

        let event = run.complete(result)?;
        self.publish(&event);
        info!(run_id = %self.id, "Analysis run complete");
        Ok(run)
    }

    /// Phase 1
    #[instrument(skip_all, fields(run_id = %self.id, phase = "extraction"))]
    async fn extract(&self, payload: &EvidencePayload) -> Result<ExtractionOutput, PipelineError> {
        let request = extraction::build_request(payload);
        let submitted: Vec<String> = payload.parts.iter().map(|p| p.file_name.clone()).collect();

        let response = with_retry(&self.config.remote.retry, RemotePhase::Extraction, || {
            self.backend.request(request.clone())
        })
        .await;
        self.ensure_current()?;

        let output = extraction::parse_response(&response?.text, &submitted)?;
        info!(
            files = output.files.len(),
            failed = output.failed_files.len(),
            claims = output.claim_count(),
            "Extraction complete"
        );
        Ok(output)
    }

    /// Phase 2
    #[instrument(skip_all, fields(run_id = %self.id, phase = "reasoning"))]
    async fn reason(&self, extraction: &ExtractionOutput) -> Result<AnalysisResult, PipelineError> {
        // One table per run, shared by the prompt and the normalization
        let credibility = &self.config.credibility;
        let request = reasoning::build_request(extraction, credibility);

        let response = with_retry(&self.config.remote.retry, RemotePhase::Reasoning, || {
            self.backend.request(request.clone())
        })
        .await;
        self.ensure_current()?;

        let result = reasoning::parse_response(&response?, credibility)?;
        info!(
            timeline = result.timeline.len(),
            contradictions = result.contradictions.len(),
            overall = result.confidence_scores.overall(),
            "Reasoning complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FixtureBackend;

    fn files(count: usize) -> Vec<EvidenceInput> {
        (0..count)
            .map(|i| EvidenceInput::from_bytes(format!("doc{}.pdf", i), "application/pdf", b"%PDF-1.4 not really".to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_refuses_single_file() {
        let orchestrator = AnalysisOrchestrator::new(Arc::new(FixtureBackend::new()), AnalyzerConfig::default());
        let err = orchestrator.submit(files(1)).err().unwrap();
        assert_eq!(err, PipelineError::TooFewFiles { count: 1, minimum: 2 });
        assert!(orchestrator.current_run_id().is_none());
    }

    #[tokio::test]
    async fn test_slot_released_after_finish() {
        let backend = Arc::new(FixtureBackend::new());
        let orchestrator = AnalysisOrchestrator::new(backend.clone(), AnalyzerConfig::default());

        // No extraction answer queued: the run fails in extraction
        let handle = orchestrator.submit(files(2)).unwrap();
        let run_id = handle.run_id();
        let run = handle.wait().await.unwrap();

        assert_eq!(run.id, run_id);
        assert_eq!(run.failed_phase(), Some(FailedPhase::Extraction));
        assert!(orchestrator.current_run_id().is_none());
        assert_eq!(backend.requests_for(RemotePhase::Extraction), 1);
    }

    #[tokio::test]
    async fn test_resume_requires_claims() {
        let orchestrator = AnalysisOrchestrator::new(Arc::new(FixtureBackend::new()), AnalyzerConfig::default());
        let empty = ExtractionOutput {
            files: vec![],
            failed_files: vec!["a.pdf".to_string()],
            raw_response: String::new(),
        };
        assert_eq!(orchestrator.resume_reasoning(empty).err(), Some(PipelineError::NoClaims));
    }
}
