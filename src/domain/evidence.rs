//! Evidence files as submitted and as produced by batch processing.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, FileError};

/// Type-specific metadata, keyed by field name. Missing fields are `null`.
pub type MetadataMap = BTreeMap<String, serde_json::Value>;

/// Broad media category, derived from the declared media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Image,
    Video,
    Audio,
    Document,
    Unknown,
}

impl Category {
    /// Categorize by media type, falling back to the `.pdf` extension for
    /// documents whose declared type is missing or generic.
    pub fn classify(media_type: &str, file_name: &str) -> Self {
        let media_type = media_type.trim().to_ascii_lowercase();

        if media_type.starts_with("image/") {
            Self::Image
        } else if media_type.starts_with("video/") {
            Self::Video
        } else if media_type.starts_with("audio/") {
            Self::Audio
        } else if media_type == "application/pdf" || has_pdf_extension(file_name) {
            Self::Document
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn has_pdf_extension(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".pdf")
}

/// Where the bytes of a submitted file live
#[derive(Debug, Clone)]
pub enum EvidenceSource {
    /// Already in memory (e.g. an upload)
    Bytes(Arc<[u8]>),

    /// On disk, read lazily during processing
    Path(PathBuf),
}

/// A raw file as handed over by the upstream collaborator
#[derive(Debug, Clone)]
pub struct EvidenceInput {
    /// File name as shown to the user
    pub name: String,

    /// Declared media type (may be empty)
    pub media_type: String,

    /// Last-modified timestamp reported by the uploader
    pub last_modified: Option<DateTime<Utc>>,

    pub source: EvidenceSource,
}

impl EvidenceInput {
    /// Create an input from in-memory bytes
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            last_modified: None,
            source: EvidenceSource::Bytes(bytes.into()),
        }
    }

    /// Create an input backed by a file on disk. The name is the path's
    /// file name.
    pub fn from_path(path: impl Into<PathBuf>, media_type: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Self {
            name,
            media_type: media_type.into(),
            last_modified: None,
            source: EvidenceSource::Path(path),
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn category(&self) -> Category {
        Category::classify(&self.media_type, &self.name)
    }

    /// Size in bytes, without reading file content
    pub async fn byte_size(&self) -> Result<u64, EncodingError> {
        match &self.source {
            EvidenceSource::Bytes(bytes) => Ok(bytes.len() as u64),
            EvidenceSource::Path(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.len())
                .map_err(|e| EncodingError::Unreadable {
                    file_name: self.name.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Load the file content
    pub async fn read(&self) -> Result<Arc<[u8]>, EncodingError> {
        match &self.source {
            EvidenceSource::Bytes(bytes) => Ok(Arc::clone(bytes)),
            EvidenceSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Arc::from)
                .map_err(|e| EncodingError::Unreadable {
                    file_name: self.name.clone(),
                    reason: e.to_string(),
                }),
        }
    }
}

/// Content prepared for transmission to the remote capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    /// Media type sent alongside the data
    pub mime_type: String,

    /// Base64-encoded content
    pub data: String,

    /// Size of the decoded content
    pub byte_len: u64,
}

/// Outcome of processing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ok,
    Failed,
}

/// One processed artifact. Built once by the batch processor and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub file_name: String,
    pub media_type: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub category: Category,

    /// Type-specific metadata (empty when extraction failed)
    pub metadata: MetadataMap,

    /// Whether metadata extraction succeeded
    pub metadata_extracted: bool,

    /// Why extraction failed, if it did
    pub metadata_error: Option<String>,

    /// Every tag read, for advanced analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_metadata: Option<MetadataMap>,

    /// `sha256:<hex>` digest of the content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Transmittable content; absent when the file failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentBlock>,

    pub status: FileStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
}

impl EvidenceFile {
    /// A file removed from the batch before extraction
    pub fn failed(input: &EvidenceInput, size: u64, error: FileError) -> Self {
        Self {
            file_name: input.name.clone(),
            media_type: input.media_type.clone(),
            size,
            last_modified: input.last_modified,
            category: input.category(),
            metadata: MetadataMap::new(),
            metadata_extracted: false,
            metadata_error: None,
            raw_metadata: None,
            sha256: None,
            content: None,
            status: FileStatus::Failed,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FileStatus::Ok
    }
}

/// Aggregate statistics for a processed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,

    /// Successful files per category
    pub categories: BTreeMap<Category, usize>,

    /// Bytes across successful files
    pub total_bytes: u64,

    /// Successful files whose metadata was extracted
    pub with_metadata: usize,

    /// `with_metadata` as a percentage of `successful`
    pub metadata_percentage: f64,
}

impl ProcessingSummary {
    pub fn from_files(files: &[EvidenceFile]) -> Self {
        let mut categories = BTreeMap::new();
        let mut total_bytes = 0;
        let mut with_metadata = 0;
        let mut successful = 0;

        for file in files.iter().filter(|f| f.is_ok()) {
            successful += 1;
            *categories.entry(file.category).or_insert(0) += 1;
            total_bytes += file.size;
            if file.metadata_extracted {
                with_metadata += 1;
            }
        }

        let metadata_percentage = if successful > 0 {
            (with_metadata as f64 / successful as f64) * 100.0
        } else {
            0.0
        };

        Self {
            total: files.len(),
            successful,
            failed: files.len() - successful,
            categories,
            total_bytes,
            with_metadata,
            metadata_percentage,
        }
    }

    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }
}
