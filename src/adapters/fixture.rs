//! Deterministic stand-in for the remote capability.
//!
//! Answers are queued per phase and handed out in order. An optional delay
//! per phase keeps a request in flight long enough to supersede it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ReasoningBackend, RemoteError, RemotePhase, RemoteRequest, RemoteResponse};
use crate::error::RemoteProtocolError;

#[derive(Default)]
struct FixtureState {
    queues: HashMap<RemotePhase, VecDeque<Result<RemoteResponse, RemoteError>>>,
    delays: HashMap<RemotePhase, Duration>,
    requests: Vec<RemoteRequest>,
}

/// Backend that replays queued answers
#[derive(Default)]
pub struct FixtureBackend {
    state: Mutex<FixtureState>,
}

impl FixtureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a successful answer for a phase
    pub fn respond(self, phase: RemotePhase, response: RemoteResponse) -> Self {
        self.push(phase, Ok(response));
        self
    }

    /// Queue a plain-text answer for a phase
    pub fn respond_text(self, phase: RemotePhase, text: impl Into<String>) -> Self {
        self.respond(phase, RemoteResponse::new(text))
    }

    /// Queue a failure for a phase
    pub fn fail(self, phase: RemotePhase, error: impl Into<RemoteError>) -> Self {
        self.push(phase, Err(error.into()));
        self
    }

    /// Hold every request of a phase for `delay` before answering
    pub fn with_delay(self, phase: RemotePhase, delay: Duration) -> Self {
        self.state().delays.insert(phase, delay);
        self
    }

    /// Queue an answer on a shared backend
    pub fn push(&self, phase: RemotePhase, answer: Result<RemoteResponse, RemoteError>) {
        self.state().queues.entry(phase).or_default().push_back(answer);
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Number of requests received for one phase
    pub fn requests_for(&self, phase: RemotePhase) -> usize {
        self.state().requests.iter().filter(|r| r.phase == phase).count()
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl ReasoningBackend for FixtureBackend {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn request(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let phase = request.phase;
        let (delay, answer) = {
            let mut state = self.state();
            state.requests.push(request);
            let delay = state.delays.get(&phase).copied();
            let answer = state.queues.get_mut(&phase).and_then(|q| q.pop_front());
            (delay, answer)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        answer.unwrap_or_else(|| {
            Err(RemoteProtocolError::new(phase.as_str(), "no fixture response queued").into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteTransportError;

    #[tokio::test]
    async fn test_answers_in_order_per_phase() {
        let backend = FixtureBackend::new()
            .respond_text(RemotePhase::Extraction, "first")
            .respond_text(RemotePhase::Extraction, "second")
            .fail(RemotePhase::Reasoning, RemoteTransportError::new("down"));

        let req = |phase| RemoteRequest::new(phase, "go");
        assert_eq!(backend.request(req(RemotePhase::Extraction)).await.unwrap().text, "first");
        assert!(backend.request(req(RemotePhase::Reasoning)).await.is_err());
        assert_eq!(backend.request(req(RemotePhase::Extraction)).await.unwrap().text, "second");

        assert_eq!(backend.request_count(), 3);
        assert_eq!(backend.requests_for(RemotePhase::Extraction), 2);
    }

    #[test]
    fn test_empty_queue_is_protocol_error() {
        let backend = FixtureBackend::new();
        let err = tokio_test::block_on(backend.request(RemoteRequest::new(RemotePhase::Reasoning, "go")))
            .unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
    }
}
