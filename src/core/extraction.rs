//! Phase 1: per-file claim extraction.
//!
//! One batched request carries every file's content, its category and its
//! extracted metadata. The answer is expected to hold a `files` array with
//! one entry per file. Entries are read leniently: claims may be plain
//! strings or objects, and a few spellings of each key are accepted.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::{RemotePart, RemotePhase, RemoteRequest};
use crate::domain::analysis::Claim;
use crate::domain::extraction::{ExtractionOutput, FileExtraction};
use crate::error::RemoteProtocolError;
use crate::ingest::payload::EvidencePayload;

use super::json::locate_json;

const INSTRUCTION: &str = r#"You are a forensic evidence extraction system. For each attached file, extract:
1. Every timestamp and date, from the metadata AND from the content
2. Every key claim, statement or event, with who made it when known
3. Locations (GPS coordinates, addresses, rooms)
4. People, organizations and other entities

Each file is followed by a line "File: <name> (<category>)" and its extracted metadata.

Return only a JSON object with this structure:
{
  "files": [
    {
      "fileName": "<name exactly as given>",
      "category": "<category>",
      "claims": [
        {"statement": "...", "timestamp": "ISO-8601 or null", "speaker": "... or null", "context": "..."}
      ],
      "timestamps": [...],
      "entities": [...],
      "locations": [...]
    }
  ]
}

Be precise. Quote statements as they appear in the evidence."#;

/// Build the Phase 1 request for a prepared payload
pub fn build_request(payload: &EvidencePayload) -> RemoteRequest {
    let mut request = RemoteRequest::new(RemotePhase::Extraction, INSTRUCTION);

    for (part, summary) in payload.parts.iter().zip(&payload.metadata) {
        let metadata = serde_json::to_string(&summary.extracted_metadata)
            .unwrap_or_else(|_| "{}".to_string());

        request = request
            .with_part(RemotePart::Inline {
                mime_type: part.content.mime_type.clone(),
                data: part.content.data.clone(),
                file_name: part.file_name.clone(),
            })
            .with_part(RemotePart::text(format!(
                "File: {} ({})",
                part.file_name, part.category
            )))
            .with_part(RemotePart::text(format!("Extracted metadata: {}", metadata)));
    }

    request
}

/// Read the Phase 1 answer.
///
/// Fails only when the answer holds no usable structure at all. Submitted
/// files without claims are listed in `failed_files`; whether an output
/// with no claims is acceptable is the caller's decision.
pub fn parse_response(text: &str, submitted: &[String]) -> Result<ExtractionOutput, RemoteProtocolError> {
    let phase = RemotePhase::Extraction.as_str();

    let value = locate_json(text)
        .ok_or_else(|| RemoteProtocolError::new(phase, "no JSON found in extraction response"))?;

    let entries = match value {
        Value::Object(mut object) => match object.remove("files") {
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(RemoteProtocolError::new(phase, "\"files\" is not an array")),
            None => return Err(RemoteProtocolError::new(phase, "response has no \"files\" array")),
        },
        Value::Array(entries) => entries,
        _ => {
            return Err(RemoteProtocolError::new(
                phase,
                "extraction response is neither an object nor an array",
            ))
        }
    };

    let mut files: Vec<FileExtraction> = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let wire: WireFile = match serde_json::from_value(entry) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed extraction entry");
                continue;
            }
        };
        let Some(returned) = wire.file_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            warn!(index, "Skipping extraction entry without a file name");
            continue;
        };
        let Some(file_name) = resolve_name(returned, submitted) else {
            warn!(index, file = %returned, "Skipping extraction entry for a file that was not submitted");
            continue;
        };
        let file = wire.into_extraction(file_name);
        if file.claims.is_empty() {
            continue;
        }

        // Several entries for one file are merged
        match files.iter_mut().find(|f| f.file_name == file.file_name) {
            Some(existing) => {
                existing.claims.extend(file.claims);
                existing.timestamps.extend(file.timestamps);
                existing.entities.extend(file.entities);
                existing.locations.extend(file.locations);
            }
            None => files.push(file),
        }
    }

    let failed_files: Vec<String> = submitted
        .iter()
        .filter(|name| !files.iter().any(|f| &f.file_name == *name))
        .cloned()
        .collect();

    for name in &failed_files {
        warn!(file = %name, "No claims extracted");
    }
    debug!(
        files = files.len(),
        failed = failed_files.len(),
        "Parsed extraction response"
    );

    Ok(ExtractionOutput {
        files,
        failed_files,
        raw_response: text.to_string(),
    })
}

/// Map a returned file name onto the submitted one it refers to
fn resolve_name(returned: &str, submitted: &[String]) -> Option<String> {
    let returned = returned.trim();
    submitted
        .iter()
        .find(|name| name.eq_ignore_ascii_case(returned))
        .cloned()
}

#[derive(Deserialize)]
struct WireFile {
    #[serde(default, rename = "fileName", alias = "filename", alias = "file_name", alias = "name")]
    file_name: Option<String>,

    #[serde(default, alias = "type")]
    category: Option<String>,

    #[serde(default)]
    claims: Option<Value>,

    #[serde(default)]
    timestamps: Option<Value>,

    #[serde(default)]
    entities: Option<Value>,

    #[serde(default)]
    locations: Option<Value>,
}

impl WireFile {
    fn into_extraction(self, file_name: String) -> FileExtraction {
        let claims = into_list(self.claims)
            .into_iter()
            .filter_map(|raw| claim_from(raw, &file_name))
            .collect();

        FileExtraction {
            category: self.category.unwrap_or_else(|| "unknown".to_string()),
            claims,
            timestamps: into_list(self.timestamps),
            entities: into_list(self.entities),
            locations: into_list(self.locations),
            file_name,
        }
    }
}

/// A list field that may also arrive as a single value or null
fn into_list(value: Option<Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.into_iter().filter(|v| !v.is_null()).collect(),
        Some(single) => vec![single],
    }
}

#[derive(Deserialize)]
struct WireClaim {
    #[serde(alias = "claim", alias = "text", alias = "description")]
    statement: String,

    #[serde(default, alias = "datetime", alias = "time", alias = "date")]
    timestamp: Option<Value>,

    #[serde(default, alias = "attribution", alias = "author")]
    speaker: Option<String>,

    #[serde(default)]
    context: Option<String>,
}

fn claim_from(raw: Value, source: &str) -> Option<Claim> {
    let wire = match raw {
        Value::String(statement) => WireClaim {
            statement,
            timestamp: None,
            speaker: None,
            context: None,
        },
        other => serde_json::from_value::<WireClaim>(other).ok()?,
    };

    let statement = wire.statement.trim().to_string();
    if statement.is_empty() {
        return None;
    }

    let timestamp = match wire.timestamp {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s).filter(|s| !s.trim().is_empty()),
        Some(other) => Some(other.to_string()),
    };

    Some(Claim {
        statement,
        timestamp,
        speaker: wire.speaker.filter(|s| !s.trim().is_empty()),
        source: source.to_string(),
        context: wire.context.filter(|s| !s.trim().is_empty()),
    })
}
