//! Phase 1 output: per-file claims and ancillary entities.

use serde::{Deserialize, Serialize};

use super::analysis::Claim;

/// Everything Phase 1 extracted from one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExtraction {
    pub file_name: String,

    /// Category as reported by the remote capability
    pub category: String,

    pub claims: Vec<Claim>,

    /// Timestamps, people and places mentioned; kept as returned
    pub timestamps: Vec<serde_json::Value>,
    pub entities: Vec<serde_json::Value>,
    pub locations: Vec<serde_json::Value>,
}

/// Complete Phase 1 output, forwarded as-is to Phase 2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutput {
    /// Files that yielded at least one claim
    pub files: Vec<FileExtraction>,

    /// Submitted files for which nothing usable came back
    pub failed_files: Vec<String>,

    /// The remote answer text, verbatim
    pub raw_response: String,
}

impl ExtractionOutput {
    pub fn claim_count(&self) -> usize {
        self.files.iter().map(|f| f.claims.len()).sum()
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.files.iter().flat_map(|f| f.claims.iter())
    }

    pub fn has_claims(&self) -> bool {
        self.claim_count() > 0
    }
}
