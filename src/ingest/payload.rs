//! Transmittable content blocks and the payload sent to Phase 1.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::evidence::{Category, ContentBlock, EvidenceFile, MetadataMap};
use crate::error::EncodingError;

/// Converts file content into base64 content blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadEncoder;

impl PayloadEncoder {
    /// Encode one file's content for transmission.
    ///
    /// Anything classified as a document by its `.pdf` extension is sent as
    /// `application/pdf`, whatever was declared. Other missing types fall
    /// back to `application/octet-stream`.
    pub fn encode(
        &self,
        file_name: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> Result<ContentBlock, EncodingError> {
        if bytes.is_empty() {
            return Err(EncodingError::Empty(file_name.to_string()));
        }

        let declared = media_type.trim().to_ascii_lowercase();
        let mime_type = if Category::classify(&declared, file_name) == Category::Document {
            "application/pdf".to_string()
        } else if declared.is_empty() {
            "application/octet-stream".to_string()
        } else {
            declared
        };

        Ok(ContentBlock {
            mime_type,
            data: BASE64.encode(bytes),
            byte_len: bytes.len() as u64,
        })
    }

    /// Collect the successful files of a batch into a Phase 1 payload.
    /// Files without content are skipped.
    pub fn prepare(&self, files: &[EvidenceFile]) -> EvidencePayload {
        let mut payload = EvidencePayload::default();

        for file in files.iter().filter(|f| f.is_ok()) {
            let Some(content) = &file.content else {
                continue;
            };

            payload.parts.push(PayloadPart {
                file_name: file.file_name.clone(),
                category: file.category,
                content: content.clone(),
            });
            payload.metadata.push(MetadataSummary {
                file_name: file.file_name.clone(),
                category: file.category,
                extracted_metadata: file.metadata.clone(),
                file_size: file.size,
                last_modified: file.last_modified,
            });
        }

        payload
    }
}

/// `sha256:<hex>` digest of file content
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// One file's content as sent to the remote capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPart {
    pub file_name: String,
    pub category: Category,
    pub content: ContentBlock,
}

/// Metadata that accompanies a file's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSummary {
    pub file_name: String,
    pub category: Category,
    pub extracted_metadata: MetadataMap,
    pub file_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Everything Phase 1 needs, in batch order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidencePayload {
    pub parts: Vec<PayloadPart>,
    pub metadata: Vec<MetadataSummary>,
}

impl EvidencePayload {
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Metadata for one file, by name
    pub fn metadata_for(&self, file_name: &str) -> Option<&MetadataSummary> {
        self.metadata.iter().find(|m| m.file_name == file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_base64() {
        let block = PayloadEncoder.encode("a.png", "image/PNG", b"hello").unwrap();
        assert_eq!(block.mime_type, "image/png");
        assert_eq!(block.data, "aGVsbG8=");
        assert_eq!(block.byte_len, 5);
    }

    #[test]
    fn test_encode_fills_missing_type() {
        let pdf = PayloadEncoder.encode("memo.pdf", "", b"%PDF").unwrap();
        assert_eq!(pdf.mime_type, "application/pdf");

        let other = PayloadEncoder.encode("blob", " ", b"x").unwrap();
        assert_eq!(other.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_generic_type_on_pdf_sent_as_pdf() {
        for declared in ["application/octet-stream", "binary/octet-stream", "Application/PDF"] {
            let block = PayloadEncoder.encode("Statement.PDF", declared, b"%PDF").unwrap();
            assert_eq!(block.mime_type, "application/pdf", "declared {declared}");
        }

        // Media types keep their declared value
        let clip = PayloadEncoder.encode("clip.pdf", "video/mp4", b"x").unwrap();
        assert_eq!(clip.mime_type, "video/mp4");
    }

    #[test]
    fn test_empty_content_is_an_encoding_error() {
        let err = PayloadEncoder.encode("empty.pdf", "application/pdf", b"").unwrap_err();
        assert_eq!(err, EncodingError::Empty("empty.pdf".to_string()));
    }

    #[test]
    fn test_fingerprint_format() {
        let hash = fingerprint(b"test content");
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 64);
        assert_eq!(hash, fingerprint(b"test content"));
        assert_ne!(hash, fingerprint(b"other content"));
    }
}
