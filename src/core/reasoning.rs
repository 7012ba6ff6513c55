//! Phase 2: cross-file reconciliation.
//!
//! The complete Phase 1 claim set goes out in one request, together with the
//! run's credibility table and the severity vocabulary. The answer is
//! normalized into an [`AnalysisResult`]:
//!
//! - timeline entries without a description or a source are dropped, the
//!   rest ordered by [`order_timeline`]
//! - contradictions citing the same source on both sides are dropped
//! - a side without a credibility takes the table's rank for its source
//! - unknown severity, credibility and confidence labels are normalized
//! - an out-of-range confidence, missing overall score or missing verdict
//!   fails the phase

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::{RemotePart, RemotePhase, RemoteRequest, RemoteResponse, ToolDeclaration};
use crate::domain::analysis::{
    AnalysisResult, ConfidenceLevel, ConfidenceScores, Contradiction, ContradictionClaim, Credibility,
    EventTime, ModelError, Severity, TamperingIndicator, TimelineEvent,
};
use crate::domain::extraction::{ExtractionOutput, FileExtraction};
use crate::error::RemoteProtocolError;

use super::credibility::CredibilityPolicy;
use super::json::locate_json;
use super::steps::{number_steps, split_steps};
use super::timeline::order_timeline;

const PHASE: &str = "reasoning";

/// What Phase 2 sees of the Phase 1 output
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReasoningInput<'a> {
    files: &'a [FileExtraction],
    #[serde(skip_serializing_if = "none_failed")]
    files_without_claims: &'a [String],
}

fn none_failed(names: &&[String]) -> bool {
    names.is_empty()
}

/// Build the Phase 2 request
pub fn build_request(extraction: &ExtractionOutput, credibility: &CredibilityPolicy) -> RemoteRequest {
    let input = ReasoningInput {
        files: &extraction.files,
        files_without_claims: &extraction.failed_files,
    };
    let data = serde_json::to_string_pretty(&input).unwrap_or_else(|_| "{}".to_string());

    RemoteRequest::new(RemotePhase::Reasoning, instruction(credibility))
        .with_part(RemotePart::text(format!("EXTRACTED DATA:\n{}", data)))
        .with_tools(tools())
}

/// Helpers the model may call while reconciling claims
fn tools() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: "extractTimestamp".to_string(),
            description: "Parse a timestamp out of free text".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text containing a date or time"}
                },
                "required": ["text"]
            }),
        },
        ToolDeclaration {
            name: "detectContradiction".to_string(),
            description: "Check whether two claims conflict in substance".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "claim1": {"type": "string"},
                    "claim2": {"type": "string"}
                },
                "required": ["claim1", "claim2"]
            }),
        },
        ToolDeclaration {
            name: "calculateConfidence".to_string(),
            description: "Score confidence from a list of supporting factors".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "factors": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["factors"]
            }),
        },
    ]
}

fn instruction(credibility: &CredibilityPolicy) -> String {
    format!(
        r#"You are a forensic evidence analyst. You are given claims extracted from several evidence files.

YOUR TASK:
1. Build a timeline of events. Order it by timestamp where known and by narrative order otherwise. Use ISO-8601 timestamps; when only an approximate time is known, give it verbatim (e.g. "late February").
2. Compare claims from DIFFERENT files and report contradictions. A contradiction requires a real conflict in substance, not different wording. Never pair two claims from the same file.
3. Rate the credibility of each side of a contradiction by source type:
{credibility}4. Rate each contradiction's severity by how material the conflict is: minor, medium, high or critical.
5. Identify signs of tampering or staging (metadata mismatches, impossible sequences).
6. Score your confidence between 0 and 1: overall, metadata and content.
7. Give a one-paragraph verdict.

Explain your reasoning step by step as "Step 1:", "Step 2:" and so on.

Return a JSON object with:
{{
  "timeline": [{{"timestamp": "...", "description": "...", "sources": ["file name"], "confidence": "very_high|high|medium|low", "reasoning": "..."}}],
  "contradictions": [{{"id": "C1", "severity": "minor|medium|high|critical",
    "claim_a": {{"statement": "...", "source": "file name", "credibility": "low|medium|high|very_high"}},
    "claim_b": {{"statement": "...", "source": "other file name", "credibility": "low|medium|high|very_high"}},
    "analysis": "...", "verdict": "which claim is more credible and why", "confidence": 0.0}}],
  "tamperingIndicators": [{{"type": "...", "description": "...", "severity": "...", "evidence": "...", "regulatoryImplication": "..."}}],
  "confidenceScores": {{"overall": 0.0, "metadata": 0.0, "content": 0.0}},
  "verdict": "...",
  "reasoning": "..."
}}"#,
        credibility = credibility.render()
    )
}

/// Normalize the Phase 2 answer into a result.
///
/// Discrete steps come from the response's thought parts, then from a
/// `thinkingSteps` array in the JSON, then from splitting the reasoning text.
pub fn parse_response(
    response: &RemoteResponse,
    credibility: &CredibilityPolicy,
) -> Result<AnalysisResult, RemoteProtocolError> {
    let value = locate_json(&response.text)
        .filter(Value::is_object)
        .ok_or_else(|| RemoteProtocolError::new(PHASE, "no JSON object found in reasoning response"))?;

    let wire: WireAnalysis = serde_json::from_value(value)
        .map_err(|e| RemoteProtocolError::new(PHASE, format!("unexpected result shape: {}", e)))?;

    let verdict = wire
        .verdict
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RemoteProtocolError::new(PHASE, "result has no verdict"))?;

    let scores = wire
        .confidence_scores
        .ok_or_else(|| RemoteProtocolError::new(PHASE, "result has no confidenceScores"))?;
    let confidence_scores = ConfidenceScores::from_map(&scores).map_err(model_error)?;

    let timeline = order_timeline(wire.timeline.into_iter().filter_map(timeline_event).collect());

    let mut contradictions = Vec::new();
    for (index, raw) in wire.contradictions.into_iter().enumerate() {
        if let Some(contradiction) = contradiction(index, raw, credibility)? {
            contradictions.push(contradiction);
        }
    }

    let tampering_indicators = wire
        .tampering_indicators
        .into_iter()
        .filter_map(tampering_indicator)
        .collect();

    let reasoning = wire.reasoning.filter(|r| !r.trim().is_empty());
    let reasoning_steps = if !response.thoughts.is_empty() {
        number_steps(response.thoughts.iter().cloned())
    } else if !wire.thinking_steps.is_empty() {
        number_steps(wire.thinking_steps)
    } else {
        number_steps(reasoning.as_deref().map(split_steps).unwrap_or_default())
    };

    debug!(
        steps = reasoning_steps.len(),
        timeline = timeline.len(),
        contradictions = contradictions.len(),
        "Parsed reasoning response"
    );

    Ok(AnalysisResult {
        reasoning_steps,
        timeline,
        contradictions,
        tampering_indicators,
        confidence_scores,
        verdict,
        reasoning,
        tool_calls: response.tool_calls.clone(),
    })
}

fn model_error(error: ModelError) -> RemoteProtocolError {
    RemoteProtocolError::new(PHASE, error.to_string())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnalysis {
    #[serde(default)]
    timeline: Vec<Value>,

    #[serde(default)]
    contradictions: Vec<Value>,

    #[serde(default)]
    tampering_indicators: Vec<Value>,

    #[serde(default)]
    confidence_scores: Option<BTreeMap<String, f64>>,

    #[serde(default)]
    verdict: Option<String>,

    #[serde(default)]
    reasoning: Option<String>,

    #[serde(default)]
    thinking_steps: Vec<String>,
}

/// A string or a list of strings
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default, alias = "datetime", alias = "time", alias = "date")]
    timestamp: Option<String>,

    #[serde(default, alias = "event", alias = "summary")]
    description: Option<String>,

    #[serde(default)]
    sources: Option<OneOrMany>,

    #[serde(default)]
    source: Option<String>,

    #[serde(default)]
    confidence: Option<String>,

    #[serde(default)]
    reasoning: Option<String>,
}

fn timeline_event(raw: Value) -> Option<TimelineEvent> {
    let wire: WireEvent = match serde_json::from_value(raw) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(error = %e, "Dropping malformed timeline entry");
            return None;
        }
    };

    let description = wire.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    let mut sources: Vec<String> = wire.sources.map(OneOrMany::into_vec).unwrap_or_default();
    sources.extend(wire.source);
    sources.retain(|s| !s.trim().is_empty());
    sources.dedup();

    let Some(description) = description else {
        warn!("Dropping timeline entry without a description");
        return None;
    };
    if sources.is_empty() {
        warn!(event = %description, "Dropping timeline entry without a source");
        return None;
    }

    Some(TimelineEvent {
        timestamp: EventTime::parse(wire.timestamp.as_deref().unwrap_or_default()),
        description,
        sources,
        confidence: wire
            .confidence
            .as_deref()
            .map(ConfidenceLevel::from_label)
            .unwrap_or(ConfidenceLevel::Low),
        reasoning: wire.reasoning.unwrap_or_default(),
    })
}

#[derive(Deserialize)]
struct WireSide {
    #[serde(alias = "claim", alias = "text")]
    statement: String,
    source: String,
    #[serde(default)]
    credibility: Option<String>,
}

#[derive(Deserialize)]
struct WireContradiction {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    severity: Option<String>,

    #[serde(default, alias = "claimA")]
    claim_a: Option<WireSide>,

    #[serde(default, alias = "claimB")]
    claim_b: Option<WireSide>,

    #[serde(default)]
    analysis: Option<String>,

    #[serde(default)]
    verdict: Option<String>,

    #[serde(default)]
    confidence: Option<f64>,
}

fn side(wire: WireSide, credibility: &CredibilityPolicy) -> ContradictionClaim {
    let rank = match wire.credibility.as_deref() {
        Some(label) if !label.trim().is_empty() => Credibility::from_label(label),
        _ => credibility.rank(&wire.source),
    };
    ContradictionClaim {
        statement: wire.statement,
        source: wire.source,
        credibility: rank,
    }
}

/// `Ok(None)` drops the entry; `Err` fails the phase
fn contradiction(
    index: usize,
    raw: Value,
    credibility: &CredibilityPolicy,
) -> Result<Option<Contradiction>, RemoteProtocolError> {
    let wire: WireContradiction = match serde_json::from_value(raw) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(index, error = %e, "Dropping malformed contradiction");
            return Ok(None);
        }
    };

    let (Some(a), Some(b)) = (wire.claim_a, wire.claim_b) else {
        warn!(index, "Dropping contradiction without two claims");
        return Ok(None);
    };
    let Some(confidence) = wire.confidence else {
        warn!(index, "Dropping contradiction without a confidence");
        return Ok(None);
    };

    let id = wire
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("C{}", index + 1));
    let severity = wire
        .severity
        .as_deref()
        .map(Severity::from_label)
        .unwrap_or(Severity::Minor);
    let claim_a = side(a, credibility);
    let claim_b = side(b, credibility);
    let verdict = wire
        .verdict
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default_verdict(&claim_a, &claim_b));

    match Contradiction::new(id, severity, claim_a, claim_b, wire.analysis, verdict, confidence) {
        Ok(contradiction) => Ok(Some(contradiction)),
        Err(ModelError::SameSource(source)) => {
            warn!(index, %source, "Dropping contradiction within a single source");
            Ok(None)
        }
        Err(e) => Err(model_error(e)),
    }
}

fn default_verdict(a: &ContradictionClaim, b: &ContradictionClaim) -> String {
    match a.credibility.cmp(&b.credibility) {
        std::cmp::Ordering::Greater => format!("{} is more credible ({})", a.source, a.credibility),
        std::cmp::Ordering::Less => format!("{} is more credible ({})", b.source, b.credibility),
        std::cmp::Ordering::Equal => "Both sources are equally credible".to_string(),
    }
}

#[derive(Deserialize)]
struct WireIndicator {
    #[serde(default, rename = "type", alias = "kind")]
    kind: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    severity: Option<String>,

    #[serde(default)]
    evidence: Option<String>,

    #[serde(default, rename = "regulatoryImplication", alias = "implication")]
    implication: Option<String>,
}

fn tampering_indicator(raw: Value) -> Option<TamperingIndicator> {
    let wire: WireIndicator = match raw {
        Value::String(description) => WireIndicator {
            kind: None,
            description: Some(description),
            severity: None,
            evidence: None,
            implication: None,
        },
        other => match serde_json::from_value(other) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "Dropping malformed tampering indicator");
                return None;
            }
        },
    };

    let description = wire.description.filter(|d| !d.trim().is_empty())?;
    Some(TamperingIndicator {
        kind: wire.kind.unwrap_or_else(|| "unspecified".to_string()),
        description,
        severity: wire
            .severity
            .as_deref()
            .map(Severity::from_label)
            .unwrap_or(Severity::Minor),
        evidence: wire.evidence,
        implication: wire.implication,
    })
}
