//! Remote reasoning capability.
//!
//! Both pipeline phases talk to the model through [`ReasoningBackend`], a
//! narrow request/response interface. The HTTP implementation lives in
//! [`gemini`]; [`fixture`] replays canned answers for tests.

pub mod fixture;
pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::analysis::ToolCall;
use crate::error::{RemoteProtocolError, RemoteTransportError};

pub use fixture::FixtureBackend;
pub use gemini::GeminiBackend;

/// Which pipeline phase issued a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePhase {
    Extraction,
    Reasoning,
}

impl RemotePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Reasoning => "reasoning",
        }
    }
}

/// One part of a request, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemotePart {
    Text {
        text: String,
    },
    Inline {
        mime_type: String,
        /// Base64-encoded content
        data: String,
        file_name: String,
    },
}

impl RemotePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A function the model may ask to call, described by a JSON schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Structured input for one remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub phase: RemotePhase,

    /// Leading instruction text
    pub instruction: String,

    /// Content following the instruction
    pub parts: Vec<RemotePart>,

    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
}

impl RemoteRequest {
    pub fn new(phase: RemotePhase, instruction: impl Into<String>) -> Self {
        Self {
            phase,
            instruction: instruction.into(),
            parts: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_part(mut self, part: RemotePart) -> Self {
        self.parts.push(part);
        self
    }

    /// Names of the files attached inline
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            RemotePart::Inline { file_name, .. } => Some(file_name.as_str()),
            RemotePart::Text { .. } => None,
        })
    }
}

/// What the capability answered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// Answer text, which should contain a JSON value
    pub text: String,

    /// Discrete reasoning steps, when the model exposes them
    pub thoughts: Vec<String>,

    /// Function calls the model asked for, in order
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl RemoteResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thoughts: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_thoughts(mut self, thoughts: Vec<String>) -> Self {
        self.thoughts = thoughts;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// Why a remote call produced no usable response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] RemoteTransportError),

    #[error(transparent)]
    Protocol(#[from] RemoteProtocolError),
}

/// The remote capability behind both phases
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Issue one request and wait for the complete answer
    async fn request(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError>;
}

impl From<RemoteError> for crate::error::PipelineError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Transport(e) => e.into(),
            RemoteError::Protocol(e) => e.into(),
        }
    }
}
