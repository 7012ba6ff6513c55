//! Concurrent validation, extraction and encoding of an evidence batch.
//!
//! Every file runs through validate → read → extract → encode on its own
//! task. Results are gathered in submission order once all tasks finish, so
//! one slow or failing file never holds up its siblings.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::evidence::{EvidenceFile, EvidenceInput, FileStatus, ProcessingSummary};
use crate::error::{BatchIncompleteError, EncodingError, FileError};

use super::metadata::{self, ExtractionOutcome, FileFacts};
use super::payload::{fingerprint, EvidencePayload, PayloadEncoder};
use super::validator::{FileDescriptor, FileLimits, FileValidator};

/// Outcome of processing a whole batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,

    /// One entry per submitted file, in submission order
    pub files: Vec<EvidenceFile>,

    /// Per-file failures, keyed by file name
    pub errors: Vec<FileError>,

    /// True only when every file succeeded
    pub success: bool,
}

impl BatchResult {
    fn from_files(files: Vec<EvidenceFile>) -> Self {
        let errors: Vec<FileError> = files.iter().filter_map(|f| f.error.clone()).collect();
        let successful_files = files.iter().filter(|f| f.is_ok()).count();

        Self {
            total_files: files.len(),
            successful_files,
            failed_files: files.len() - successful_files,
            success: successful_files == files.len(),
            files,
            errors,
        }
    }

    /// Aggregate statistics over the processed files
    pub fn summary(&self) -> ProcessingSummary {
        ProcessingSummary::from_files(&self.files)
    }

    /// The files that made it through
    pub fn successful(&self) -> impl Iterator<Item = &EvidenceFile> {
        self.files.iter().filter(|f| f.is_ok())
    }

    /// The error a caller that rejects partial batches should raise
    pub fn incomplete_error(&self) -> Option<BatchIncompleteError> {
        (!self.success).then(|| BatchIncompleteError {
            total: self.total_files,
            errors: self.errors.clone(),
        })
    }

    /// Phase 1 payload built from the successful files
    pub fn payload(&self) -> EvidencePayload {
        PayloadEncoder.prepare(&self.files)
    }
}

/// Runs the per-file stages over a batch
#[derive(Debug, Clone, Default)]
pub struct EvidenceBatchProcessor {
    validator: FileValidator,
    encoder: PayloadEncoder,
}

impl EvidenceBatchProcessor {
    pub fn new(limits: FileLimits) -> Self {
        Self {
            validator: FileValidator::new(limits),
            encoder: PayloadEncoder,
        }
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    /// Process every file concurrently and aggregate the results.
    ///
    /// Never fails as a whole: per-file errors are collected on the result.
    #[instrument(skip(self, inputs), fields(files = inputs.len()))]
    pub async fn process(&self, inputs: Vec<EvidenceInput>) -> BatchResult {
        // Sizes first: the batch ceiling needs every size before any file
        // is read
        let mut sized = Vec::with_capacity(inputs.len());
        for input in inputs {
            let size = input.byte_size().await;
            sized.push((input, size));
        }

        let total: u64 = sized
            .iter()
            .filter_map(|(_, size)| size.as_ref().ok())
            .sum();

        if let Err(e) = self.validator.validate_total(total) {
            warn!(total, error = %e, "Batch exceeds total size limit");
            let files = sized
                .iter()
                .map(|(input, size)| {
                    let size = size.as_ref().copied().unwrap_or(0);
                    EvidenceFile::failed(input, size, FileError::validation(&input.name, &e))
                })
                .collect();
            return BatchResult::from_files(files);
        }

        // Fan out
        let handles: Vec<_> = sized
            .into_iter()
            .map(|(input, size)| {
                let submitted = input.clone();
                let handle = tokio::spawn(process_file(self.validator, self.encoder, input, size));
                (submitted, handle)
            })
            .collect();

        // Fan in, preserving submission order
        let mut files = Vec::with_capacity(handles.len());
        for (submitted, handle) in handles {
            match handle.await {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!(file = %submitted.name, error = %e, "File task did not complete");
                    let error =
                        FileError::internal(&submitted.name, format!("processing task failed: {e}"));
                    files.push(EvidenceFile::failed(&submitted, 0, error));
                }
            }
        }

        let result = BatchResult::from_files(files);
        info!(
            successful = result.successful_files,
            failed = result.failed_files,
            "Batch processed"
        );
        result
    }
}

async fn process_file(
    validator: FileValidator,
    encoder: PayloadEncoder,
    input: EvidenceInput,
    size: Result<u64, EncodingError>,
) -> EvidenceFile {
    let size = match size {
        Ok(size) => size,
        Err(e) => {
            warn!(file = %input.name, error = %e, "Cannot stat file");
            return EvidenceFile::failed(&input, 0, FileError::encoding(&input.name, &e));
        }
    };

    let descriptor = FileDescriptor {
        name: &input.name,
        media_type: &input.media_type,
        size,
    };
    if let Err(e) = validator.validate(&descriptor) {
        warn!(file = %input.name, error = %e, "File rejected");
        return EvidenceFile::failed(&input, size, FileError::validation(&input.name, &e));
    }

    let bytes = match input.read().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(file = %input.name, error = %e, "Cannot read file");
            return EvidenceFile::failed(&input, size, FileError::encoding(&input.name, &e));
        }
    };
    // The file may have changed since it was sized
    let size = bytes.len() as u64;
    let descriptor = FileDescriptor { size, ..descriptor };
    if let Err(e) = validator.validate(&descriptor) {
        warn!(file = %input.name, error = %e, "File rejected after reading");
        return EvidenceFile::failed(&input, size, FileError::validation(&input.name, &e));
    }

    let outcome = extract_metadata(&input, size, Arc::clone(&bytes)).await;

    let content = match encoder.encode(&input.name, &input.media_type, &bytes) {
        Ok(content) => content,
        Err(e) => {
            warn!(file = %input.name, error = %e, "Cannot encode file");
            return EvidenceFile::failed(&input, size, FileError::encoding(&input.name, &e));
        }
    };

    debug!(file = %input.name, metadata = outcome.success, "File processed");

    EvidenceFile {
        file_name: input.name.clone(),
        media_type: input.media_type.clone(),
        size,
        last_modified: input.last_modified,
        category: input.category(),
        metadata: outcome.metadata,
        metadata_extracted: outcome.success,
        metadata_error: outcome.error,
        raw_metadata: outcome.raw_metadata,
        sha256: Some(fingerprint(&bytes)),
        content: Some(content),
        status: FileStatus::Ok,
        error: None,
    }
}

/// Header parsing is synchronous, so it runs on the blocking pool
async fn extract_metadata(input: &EvidenceInput, size: u64, bytes: Arc<[u8]>) -> ExtractionOutcome {
    let category = input.category();
    let name = input.name.clone();
    let media_type = input.media_type.clone();
    let last_modified = input.last_modified;

    let task = tokio::task::spawn_blocking(move || {
        let facts = FileFacts {
            name: &name,
            media_type: &media_type,
            size,
            last_modified,
        };
        metadata::extract(category, &facts, &bytes)
    });

    match task.await {
        Ok(outcome) => outcome,
        Err(e) => ExtractionOutcome {
            success: false,
            error: Some(format!("metadata extraction aborted: {e}")),
            ..Default::default()
        },
    }
}
