//! Type and size policy for evidence files.
//!
//! Enforces:
//! - An allow-list of media types (images, video, audio, PDF)
//! - A per-file size ceiling
//! - A ceiling on the total size of a batch

use serde::{Deserialize, Serialize};

use crate::domain::evidence::has_pdf_extension;
use crate::error::ValidationError;

const MEGABYTE: u64 = 1024 * 1024;

/// Size limits for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLimits {
    /// Maximum size of any single file (default: 20MB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Maximum combined size of a batch (default: 50MB)
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,

    /// Minimum number of files for a run (default: 2)
    #[serde(default = "default_min_files")]
    pub min_files: usize,
}

fn default_max_file_bytes() -> u64 {
    20 * MEGABYTE
}
fn default_max_total_bytes() -> u64 {
    50 * MEGABYTE
}
fn default_min_files() -> usize {
    2
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            min_files: default_min_files(),
        }
    }
}

/// What the validator needs to know about a file
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor<'a> {
    pub name: &'a str,
    pub media_type: &'a str,
    pub size: u64,
}

/// Stateless validator; the same descriptor always gets the same verdict
#[derive(Debug, Clone, Copy, Default)]
pub struct FileValidator {
    limits: FileLimits,
}

impl FileValidator {
    pub fn new(limits: FileLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &FileLimits {
        &self.limits
    }

    /// Check one file against the type allow-list and the per-file ceiling
    pub fn validate(&self, file: &FileDescriptor<'_>) -> Result<(), ValidationError> {
        self.validate_type(file)?;

        if file.size > self.limits.max_file_bytes {
            return Err(ValidationError::FileTooLarge {
                file_name: file.name.to_string(),
                size: file.size,
                limit_mb: self.limits.max_file_bytes / MEGABYTE,
            });
        }

        Ok(())
    }

    /// Check the combined size of a batch
    pub fn validate_total(&self, total: u64) -> Result<(), ValidationError> {
        if total > self.limits.max_total_bytes {
            return Err(ValidationError::BatchTooLarge {
                total,
                limit_mb: self.limits.max_total_bytes / MEGABYTE,
            });
        }
        Ok(())
    }

    fn validate_type(&self, file: &FileDescriptor<'_>) -> Result<(), ValidationError> {
        if is_supported_media_type(file.media_type) {
            return Ok(());
        }

        // Uploaders sometimes leave the type of a PDF empty
        if has_pdf_extension(file.name) {
            return Ok(());
        }

        let media_type = if file.media_type.trim().is_empty() {
            "unknown".to_string()
        } else {
            file.media_type.to_string()
        };
        Err(ValidationError::UnsupportedType { media_type })
    }
}

/// `image/*`, `video/*`, `audio/*` or `application/pdf`
pub fn is_supported_media_type(media_type: &str) -> bool {
    let media_type = media_type.trim().to_ascii_lowercase();
    let Some((top, sub)) = media_type.split_once('/') else {
        return false;
    };
    if sub.is_empty() {
        return false;
    }

    matches!(top, "image" | "video" | "audio") || media_type == "application/pdf"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor<'a>(name: &'a str, media_type: &'a str, size: u64) -> FileDescriptor<'a> {
        FileDescriptor {
            name,
            media_type,
            size,
        }
    }

    #[test]
    fn test_default_limits() {
        let limits = FileLimits::default();
        assert_eq!(limits.max_file_bytes, 20 * 1024 * 1024);
        assert_eq!(limits.max_total_bytes, 50 * 1024 * 1024);
        assert_eq!(limits.min_files, 2);
    }

    #[test]
    fn test_allow_list() {
        assert!(is_supported_media_type("image/heic"));
        assert!(is_supported_media_type("video/quicktime"));
        assert!(is_supported_media_type("Audio/Ogg"));
        assert!(is_supported_media_type("application/pdf"));

        assert!(!is_supported_media_type("application/zip"));
        assert!(!is_supported_media_type("text/plain"));
        assert!(!is_supported_media_type("image/"));
        assert!(!is_supported_media_type(""));
    }

    #[test]
    fn test_pdf_extension_fallback() {
        let validator = FileValidator::default();
        assert!(validator.validate(&descriptor("minutes.pdf", "", 10)).is_ok());
        assert!(validator
            .validate(&descriptor("notes.txt", "", 10))
            .is_err());
    }

    #[test]
    fn test_unsupported_type_reason() {
        let validator = FileValidator::default();
        let err = validator
            .validate(&descriptor("payload.exe", "application/x-msdownload", 10))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                media_type: "application/x-msdownload".to_string()
            }
        );

        let err = validator.validate(&descriptor("blob", "", 10)).unwrap_err();
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn test_per_file_ceiling() {
        let validator = FileValidator::new(FileLimits {
            max_file_bytes: 100,
            ..Default::default()
        });

        assert!(validator.validate(&descriptor("a.png", "image/png", 100)).is_ok());
        let result = validator.validate(&descriptor("a.png", "image/png", 101));
        assert!(matches!(result, Err(ValidationError::FileTooLarge { .. })));
    }

    #[test]
    fn test_batch_ceiling() {
        let validator = FileValidator::default();
        assert!(validator.validate_total(50 * 1024 * 1024).is_ok());
        let result = validator.validate_total(50 * 1024 * 1024 + 1);
        assert!(matches!(
            result,
            Err(ValidationError::BatchTooLarge { limit_mb: 50, .. })
        ));
    }
}
