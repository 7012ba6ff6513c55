//! Type-specific metadata extraction.
//!
//! One strategy per category behind [`MetadataExtractor`]. Every strategy
//! produces the same [`ExtractionOutcome`] shape, so nothing downstream
//! branches on category. Extraction never removes a file from a batch: a
//! failure leaves the file with empty (or basic) metadata.

mod document;
mod image;
mod media;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::domain::evidence::{Category, MetadataMap};
use crate::error::ExtractionError;

pub use document::DocumentExtractor;
pub use image::{dms_to_decimal, ImageExtractor};
pub use media::{AudioExtractor, VideoExtractor};

/// What an extractor may know about a file besides its bytes
#[derive(Debug, Clone, Copy)]
pub struct FileFacts<'a> {
    pub name: &'a str,
    pub media_type: &'a str,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileFacts<'_> {
    /// Lowercased extension, used as a probing hint
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    fn last_modified_json(&self) -> serde_json::Value {
        json!(self.last_modified.map(|t| t.to_rfc3339()))
    }
}

/// Fields read by a successful extraction
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    /// Curated fields; absent tags are `null`
    pub metadata: MetadataMap,

    /// Every tag read, when the format has more than the curated set
    pub raw: Option<MetadataMap>,
}

/// One metadata strategy
pub trait MetadataExtractor: Send + Sync {
    /// Human-readable strategy name
    fn name(&self) -> &'static str;

    /// Read metadata from the file content. Never decodes more than the
    /// headers need.
    fn extract(&self, file: &FileFacts<'_>, bytes: &[u8]) -> Result<Extracted, ExtractionError>;
}

/// Uniform result of metadata extraction, whatever the category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub success: bool,
    pub metadata: MetadataMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_metadata: Option<MetadataMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionOutcome {
    fn failed(error: &ExtractionError, metadata: MetadataMap) -> Self {
        Self {
            success: false,
            metadata,
            raw_metadata: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<Extracted> for ExtractionOutcome {
    fn from(extracted: Extracted) -> Self {
        Self {
            success: true,
            metadata: extracted.metadata,
            raw_metadata: extracted.raw,
            error: None,
        }
    }
}

static IMAGE: ImageExtractor = ImageExtractor;
static VIDEO: VideoExtractor = VideoExtractor;
static AUDIO: AudioExtractor = AudioExtractor;
static DOCUMENT: DocumentExtractor = DocumentExtractor;

/// The strategy for a category; `None` for [`Category::Unknown`]
pub fn extractor_for(category: Category) -> Option<&'static dyn MetadataExtractor> {
    match category {
        Category::Image => Some(&IMAGE),
        Category::Video => Some(&VIDEO),
        Category::Audio => Some(&AUDIO),
        Category::Document => Some(&DOCUMENT),
        Category::Unknown => None,
    }
}

/// Extract metadata for a file of the given category.
///
/// Files of unknown category get a failed outcome carrying basic file facts.
pub fn extract(category: Category, file: &FileFacts<'_>, bytes: &[u8]) -> ExtractionOutcome {
    let Some(extractor) = extractor_for(category) else {
        let error = ExtractionError::Unsupported(file.media_type.to_string());
        return ExtractionOutcome::failed(&error, basic_facts(file));
    };

    match extractor.extract(file, bytes) {
        Ok(extracted) => extracted.into(),
        Err(e) => {
            debug!(file = %file.name, extractor = extractor.name(), error = %e, "Metadata extraction failed");
            ExtractionOutcome::failed(&e, MetadataMap::new())
        }
    }
}

fn basic_facts(file: &FileFacts<'_>) -> MetadataMap {
    MetadataMap::from([
        ("fileName".to_string(), json!(file.name)),
        ("fileSize".to_string(), json!(file.size)),
        ("fileType".to_string(), json!(file.media_type)),
        ("lastModified".to_string(), file.last_modified_json()),
    ])
}
