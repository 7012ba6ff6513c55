//! Analysis result model: claims, timeline, contradictions, scores.
//!
//! The producer of this data is a remote model whose vocabulary cannot be
//! fully controlled. Enumerated labels are therefore normalized on the way
//! in (unknown values map to the most conservative member), while structural
//! invariants (cross-source contradictions, scores in [0,1]) are enforced by
//! the constructors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Construction errors for model types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Contradiction sides must come from different sources (both cite '{0}')")]
    SameSource(String),

    #[error("Confidence '{key}' must lie in [0, 1], got {value}")]
    OutOfRange { key: String, value: f64 },

    #[error("Confidence scores must include an 'overall' value")]
    MissingOverall,
}

fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// Materiality of a contradiction, as a total order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a free-form label onto the scale. Unknown labels become `Minor`.
    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "critical" | "severe" => Self::Critical,
            "high" | "major" => Self::High,
            "medium" | "moderate" => Self::Medium,
            _ => Self::Minor,
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// Trust rating of one claim or source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Credibility {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Credibility {
    /// Unknown labels become `Low`.
    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "very_high" | "veryhigh" => Self::VeryHigh,
            "high" => Self::High,
            "medium" | "moderate" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for Credibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Credibility {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// Confidence in a timeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Unknown labels (including compound ones such as "high claim was made,
    /// low claim is true") become `Low`.
    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "very_high" | "veryhigh" => Self::VeryHigh,
            "high" => Self::High,
            "medium" | "moderate" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl<'de> Deserialize<'de> for ConfidenceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// An atomic assertion extracted from one file during Phase 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub statement: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    /// Name of the file the claim came from
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Best-known time of a timeline event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "precision", content = "value", rename_all = "snake_case")]
pub enum EventTime {
    /// A full date and time (UTC when the source carried an offset)
    Exact(NaiveDateTime),

    /// A calendar day
    Date(NaiveDate),

    /// Anything else, kept verbatim ("late February", "unknown")
    Approximate(String),
}

impl EventTime {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Self::Exact(dt.naive_utc());
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Self::Exact(dt);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Self::Date(date);
        }

        if raw.is_empty() {
            Self::Approximate("unknown".to_string())
        } else {
            Self::Approximate(raw.to_string())
        }
    }

    /// Sort key; `None` for approximate times
    pub fn sort_key(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Exact(dt) => Some(*dt),
            Self::Date(date) => Some(date.and_time(NaiveTime::MIN)),
            Self::Approximate(_) => None,
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, Self::Approximate(_))
    }
}

/// A reconciled point-in-time assertion, produced in Phase 2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub timestamp: EventTime,
    pub description: String,

    /// Supporting files (at least one)
    pub sources: Vec<String>,

    pub confidence: ConfidenceLevel,
    pub reasoning: String,
}

/// One side of a contradiction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContradictionClaim {
    pub statement: String,
    pub source: String,
    pub credibility: Credibility,
}

/// Two conflicting claims from different sources
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contradiction {
    id: String,
    severity: Severity,
    claim_a: ContradictionClaim,
    claim_b: ContradictionClaim,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<String>,
    verdict: String,
    confidence: f64,
}

impl Contradiction {
    /// Bind two claims into a contradiction.
    ///
    /// Rejects pairs citing the same source and confidence outside [0,1].
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        claim_a: ContradictionClaim,
        claim_b: ContradictionClaim,
        analysis: Option<String>,
        verdict: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, ModelError> {
        if claim_a.source.trim().eq_ignore_ascii_case(claim_b.source.trim()) {
            return Err(ModelError::SameSource(claim_a.source));
        }
        check_unit_interval("confidence", confidence)?;

        Ok(Self {
            id: id.into(),
            severity,
            claim_a,
            claim_b,
            analysis,
            verdict: verdict.into(),
            confidence,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn claim_a(&self) -> &ContradictionClaim {
        &self.claim_a
    }

    pub fn claim_b(&self) -> &ContradictionClaim {
        &self.claim_b
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    pub fn verdict(&self) -> &str {
        &self.verdict
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// The side judged more credible; `None` on a tie
    pub fn more_credible(&self) -> Option<&ContradictionClaim> {
        match self.claim_a.credibility.cmp(&self.claim_b.credibility) {
            std::cmp::Ordering::Greater => Some(&self.claim_a),
            std::cmp::Ordering::Less => Some(&self.claim_b),
            std::cmp::Ordering::Equal => None,
        }
    }
}

fn check_unit_interval(key: &str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ModelError::OutOfRange {
            key: key.to_string(),
            value,
        })
    }
}

/// Overall and per-axis confidence, every value in [0,1]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceScores {
    overall: f64,
    #[serde(flatten)]
    axes: BTreeMap<String, f64>,
}

impl ConfidenceScores {
    pub fn new(overall: f64) -> Result<Self, ModelError> {
        check_unit_interval("overall", overall)?;
        Ok(Self {
            overall,
            axes: BTreeMap::new(),
        })
    }

    /// Set a per-axis score; the key `overall` replaces the overall score
    pub fn with_axis(mut self, key: impl Into<String>, value: f64) -> Result<Self, ModelError> {
        let key = key.into();
        check_unit_interval(&key, value)?;
        if key == "overall" {
            self.overall = value;
        } else {
            self.axes.insert(key, value);
        }
        Ok(self)
    }

    /// Build from a flat map that must contain `overall`
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self, ModelError> {
        let overall = *map.get("overall").ok_or(ModelError::MissingOverall)?;
        map.iter()
            .filter(|(key, _)| key.as_str() != "overall")
            .try_fold(Self::new(overall)?, |scores, (key, value)| {
                scores.with_axis(key.clone(), *value)
            })
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn metadata(&self) -> Option<f64> {
        self.axes.get("metadata").copied()
    }

    pub fn content(&self) -> Option<f64> {
        self.axes.get("content").copied()
    }

    pub fn axis(&self, key: &str) -> Option<f64> {
        if key == "overall" {
            Some(self.overall)
        } else {
            self.axes.get(key).copied()
        }
    }
}

impl<'de> Deserialize<'de> for ConfidenceScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, f64>::deserialize(deserializer)?;
        Self::from_map(&map).map_err(serde::de::Error::custom)
    }
}

/// A sign that evidence may have been altered or staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperingIndicator {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "regulatoryImplication")]
    pub implication: Option<String>,
}

/// One human-readable step of Phase 2 reasoning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based position in the sequence
    pub index: usize,
    pub text: String,
}

/// A helper function the model asked to call during Phase 2.
///
/// Calls are recorded as returned; nothing executes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,

    #[serde(default)]
    pub args: serde_json::Value,
}

/// The terminal artifact of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub reasoning_steps: Vec<ReasoningStep>,
    pub timeline: Vec<TimelineEvent>,
    pub contradictions: Vec<Contradiction>,
    pub tampering_indicators: Vec<TamperingIndicator>,
    pub confidence_scores: ConfidenceScores,

    /// One-paragraph summary verdict
    pub verdict: String,

    /// Overall reasoning narrative, when the model provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AnalysisResult {
    /// Contradictions at or above a severity
    pub fn contradictions_at_least(&self, severity: Severity) -> impl Iterator<Item = &Contradiction> {
        self.contradictions
            .iter()
            .filter(move |c| c.severity() >= severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(source: &str, credibility: Credibility) -> ContradictionClaim {
        ContradictionClaim {
            statement: format!("statement from {}", source),
            source: source.to_string(),
            credibility,
        }
    }

    #[test]
    fn test_severity_is_ordered() {
        assert!(Severity::Minor < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_unknown_labels_are_conservative() {
        assert_eq!(Severity::from_label("catastrophic?"), Severity::Minor);
        assert_eq!(Severity::from_label("Major"), Severity::High);
        assert_eq!(Credibility::from_label("Very High"), Credibility::VeryHigh);
        assert_eq!(Credibility::from_label("trustworthy"), Credibility::Low);
        assert_eq!(
            ConfidenceLevel::from_label("high claim was made, low claim is true"),
            ConfidenceLevel::Low
        );
    }

    #[test]
    fn test_labels_deserialize_through_normalization() {
        let severity: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(severity, Severity::Critical);
        let credibility: Credibility = serde_json::from_str("\"very-high\"").unwrap();
        assert_eq!(credibility, Credibility::VeryHigh);
    }

    #[test]
    fn test_contradiction_rejects_same_source() {
        let result = Contradiction::new(
            "C1",
            Severity::Critical,
            side("interview.mp3", Credibility::Low),
            side("Interview.mp3", Credibility::High),
            None,
            "n/a",
            0.9,
        );
        assert!(matches!(result, Err(ModelError::SameSource(_))));
    }

    #[test]
    fn test_contradiction_more_credible_side() {
        let c = Contradiction::new(
            "C1",
            Severity::High,
            side("interview.mp3", Credibility::Low),
            side("access_log.png", Credibility::VeryHigh),
            Some("log places the CEO in the meeting".to_string()),
            "Access log is more credible",
            0.97,
        )
        .unwrap();
        assert_eq!(c.more_credible().unwrap().source, "access_log.png");
        assert_eq!(c.analysis(), Some("log places the CEO in the meeting"));
    }

    #[test]
    fn test_contradiction_confidence_range() {
        let result = Contradiction::new(
            "C1",
            Severity::High,
            side("a.pdf", Credibility::Low),
            side("b.pdf", Credibility::High),
            None,
            "b wins",
            97.0,
        );
        assert!(matches!(result, Err(ModelError::OutOfRange { .. })));
    }

    #[test]
    fn test_confidence_scores_bounds() {
        assert!(ConfidenceScores::new(0.0).is_ok());
        assert!(ConfidenceScores::new(1.0).is_ok());
        assert!(ConfidenceScores::new(1.01).is_err());
        assert!(ConfidenceScores::new(-0.1).is_err());
        assert!(ConfidenceScores::new(f64::NAN).is_err());
    }

    #[test]
    fn test_confidence_scores_flat_serde() {
        let scores: ConfidenceScores =
            serde_json::from_str(r#"{"overall":0.95,"metadata":0.98,"content":0.92}"#).unwrap();
        assert_eq!(scores.overall(), 0.95);
        assert_eq!(scores.metadata(), Some(0.98));
        assert_eq!(scores.content(), Some(0.92));

        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["overall"], 0.95);
        assert_eq!(json["content"], 0.92);

        let bad = serde_json::from_str::<ConfidenceScores>(r#"{"overall":0.5,"content":1.5}"#);
        assert!(bad.is_err());
        let missing = serde_json::from_str::<ConfidenceScores>(r#"{"content":0.5}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_overall_axis_replaces_overall() {
        let scores = ConfidenceScores::new(0.2)
            .unwrap()
            .with_axis("overall", 0.9)
            .unwrap()
            .with_axis("content", 0.5)
            .unwrap();
        assert_eq!(scores.overall(), 0.9);

        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json.matches("\"overall\"").count(), 1);
        let back: ConfidenceScores = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn test_event_time_parsing() {
        assert!(matches!(EventTime::parse("2025-03-05T08:42:15Z"), EventTime::Exact(_)));
        assert!(matches!(EventTime::parse("2025-03-05T08:42:00"), EventTime::Exact(_)));
        assert!(matches!(EventTime::parse("2025-03-06"), EventTime::Date(_)));
        assert_eq!(
            EventTime::parse("late February"),
            EventTime::Approximate("late February".to_string())
        );
        assert!(EventTime::parse("").is_approximate());
    }

    #[test]
    fn test_event_time_serializes_precision_marker() {
        let json = serde_json::to_value(EventTime::parse("around noon")).unwrap();
        assert_eq!(json["precision"], "approximate");
        assert_eq!(json["value"], "around noon");
    }
}
