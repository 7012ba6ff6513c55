//! Error taxonomy for the evidence pipeline.
//!
//! Per-file errors (validation, extraction, encoding) are collected as values
//! on the batch result. Run-fatal errors abort the run into `Failed` and are
//! wrapped by [`PipelineError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::run::TransitionError;

/// A file violated the type or size policy. Fatal to that file only.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ValidationError {
    #[error("Unsupported file type: {media_type}. Supported types: images, videos, audio, and PDFs.")]
    UnsupportedType { media_type: String },

    #[error("File \"{file_name}\" exceeds maximum size of {limit_mb}MB ({size} bytes)")]
    FileTooLarge {
        file_name: String,
        size: u64,
        limit_mb: u64,
    },

    #[error("Total file size exceeds maximum of {limit_mb}MB ({total} bytes)")]
    BatchTooLarge { total: u64, limit_mb: u64 },
}

/// Metadata could not be read. Never fatal: the file proceeds with empty
/// or partial metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("No {0} metadata found")]
    NotFound(&'static str),

    #[error("Failed to read {kind} headers: {reason}")]
    Unreadable { kind: &'static str, reason: String },

    #[error("Unsupported file type: {0}")]
    Unsupported(String),
}

/// File content could not be read for transmission. Fatal to the file,
/// not to the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Failed to read file: {file_name}: {reason}")]
    Unreadable { file_name: String, reason: String },

    #[error("File is empty: {0}")]
    Empty(String),
}

/// Which per-file stage produced a [`FileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    Validation,
    Encoding,
    Internal,
}

/// A per-file failure, keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_name: String,
    pub kind: FileErrorKind,
    pub message: String,
}

impl FileError {
    pub fn validation(file_name: impl Into<String>, error: &ValidationError) -> Self {
        Self {
            file_name: file_name.into(),
            kind: FileErrorKind::Validation,
            message: error.to_string(),
        }
    }

    pub fn encoding(file_name: impl Into<String>, error: &EncodingError) -> Self {
        Self {
            file_name: file_name.into(),
            kind: FileErrorKind::Encoding,
            message: error.to_string(),
        }
    }

    pub fn internal(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            kind: FileErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// One or more files failed validation or encoding. Fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} of {total} files failed processing: {}", .errors.len(), summarize(.errors))]
pub struct BatchIncompleteError {
    pub total: usize,
    pub errors: Vec<FileError>,
}

fn summarize(errors: &[FileError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.file_name, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The remote capability answered, but not with usable structured output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed {phase} response: {message}")]
pub struct RemoteProtocolError {
    pub phase: &'static str,
    pub message: String,
}

impl RemoteProtocolError {
    pub fn new(phase: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// Network, timeout or quota failure talking to the remote capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Remote transport failure{}: {message}", status_suffix(.status))]
pub struct RemoteTransportError {
    pub status: Option<u16>,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl RemoteTransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// Errors raised to callers of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("At least {minimum} files are required for cross-source analysis, got {count}")]
    TooFewFiles { count: usize, minimum: usize },

    #[error(transparent)]
    BatchIncomplete(#[from] BatchIncompleteError),

    #[error(transparent)]
    RemoteProtocol(#[from] RemoteProtocolError),

    #[error(transparent)]
    RemoteTransport(#[from] RemoteTransportError),

    #[error("No claims to reconcile")]
    NoClaims,

    #[error("Run {run_id} was cancelled or superseded and its output discarded")]
    Superseded { run_id: Uuid },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl PipelineError {
    /// Transport failures are the only ones worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteTransport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_name_the_limit() {
        let err = ValidationError::FileTooLarge {
            file_name: "clip.mp4".to_string(),
            size: 30 * 1024 * 1024,
            limit_mb: 20,
        };
        assert!(err.to_string().contains("clip.mp4"));
        assert!(err.to_string().contains("20MB"));
    }

    #[test]
    fn test_batch_incomplete_lists_files() {
        let err = BatchIncompleteError {
            total: 3,
            errors: vec![FileError::internal("a.pdf", "boom")],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("1 of 3 files failed"));
        assert!(msg.contains("a.pdf: boom"));
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(PipelineError::from(RemoteTransportError::new("timeout")).is_retryable());
        assert!(!PipelineError::from(RemoteProtocolError::new("reasoning", "bad json")).is_retryable());
    }

    #[test]
    fn test_transport_display_includes_status() {
        let err = RemoteTransportError::with_status(429, "quota exceeded");
        assert_eq!(err.to_string(), "Remote transport failure (HTTP 429): quota exceeded");
    }
}
