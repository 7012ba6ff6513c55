//! Source-type credibility ranking.
//!
//! A configurable table mapping source descriptions to a credibility rank.
//! A run snapshots the table once, so every contradiction in that run is
//! ranked against the same rules.

use serde::{Deserialize, Serialize};

use crate::domain::analysis::Credibility;

/// One row of the ranking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredibilityRule {
    /// Source type, as shown to the model
    pub label: String,

    /// Words of a source name that select this rule. Matched
    /// case-insensitively against whole words, so `log` selects
    /// `access_log.csv` and `logs.txt` but not `blog_post.txt`.
    #[serde(default)]
    pub keywords: Vec<String>,

    pub credibility: Credibility,
}

impl CredibilityRule {
    pub fn new(label: &str, keywords: &[&str], credibility: Credibility) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            credibility,
        }
    }

    fn matches(&self, words: &[String]) -> bool {
        self.keywords.iter().any(|keyword| {
            let wanted = split_words(keyword);
            !wanted.is_empty()
                && words.windows(wanted.len()).any(|window| {
                    window
                        .iter()
                        .zip(&wanted)
                        .all(|(word, want)| word == want || word.strip_suffix('s') == Some(want.as_str()))
                })
        })
    }
}

/// Lowercase words of a name, split on anything that is not alphanumeric
/// and on lower-to-upper case changes (`accessLog` is `access`, `log`)
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_numeric();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Ordered ranking table; the first matching rule wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredibilityPolicy {
    /// Rank for sources no rule matches
    #[serde(default = "default_credibility")]
    pub default: Credibility,

    #[serde(default = "default_rules")]
    pub rules: Vec<CredibilityRule>,
}

fn default_credibility() -> Credibility {
    Credibility::Medium
}

fn default_rules() -> Vec<CredibilityRule> {
    use Credibility::*;

    vec![
        CredibilityRule::new("system or access log", &["log", "access", "audit", "badge", "keycard"], VeryHigh),
        CredibilityRule::new(
            "financial or regulated record",
            &["statement", "brokerage", "bank", "invoice", "receipt", "ledger", "filing"],
            High,
        ),
        CredibilityRule::new("written correspondence", &["email", "mail", "memo", "letter"], High),
        CredibilityRule::new(
            "official record or transcript",
            &["minutes", "transcript", "meeting", "record", "report"],
            High,
        ),
        CredibilityRule::new(
            "photo or video capture",
            &["img", "photo", "image", "video", "clip", "cctv", "footage"],
            Medium,
        ),
        CredibilityRule::new(
            "interview or self-reported narrative",
            &["interview", "testimony", "script", "narrative", "blog", "post"],
            Low,
        ),
    ]
}

impl Default for CredibilityPolicy {
    fn default() -> Self {
        Self {
            default: default_credibility(),
            rules: default_rules(),
        }
    }
}

impl CredibilityPolicy {
    /// The rule that applies to a source, if any
    pub fn rule_for(&self, source: &str) -> Option<&CredibilityRule> {
        let words = split_words(source);
        self.rules.iter().find(|rule| rule.matches(&words))
    }

    /// Credibility of a source under this table
    pub fn rank(&self, source: &str) -> Credibility {
        self.rule_for(source)
            .map(|rule| rule.credibility)
            .unwrap_or(self.default)
    }

    /// The table as instruction text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str(&format!(
                "- {} (names containing: {}): {}\n",
                rule.label,
                rule.keywords.join(", "),
                rule.credibility
            ));
        }
        out.push_str(&format!("- any other source: {}\n", self.default));
        out
    }
}
