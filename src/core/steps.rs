//! Splitting reasoning text into discrete, numbered steps.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::analysis::ReasoningStep;

/// Matches a `Step N:` marker at the start of a line, allowing markdown
/// decoration ("**Step 2:**", "### Step 3.")
fn step_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"(?mi)^[ \t>*_#-]*step\s+\d+\s*[:.)]").ok())
        .as_ref()
}

fn blank_line() -> Option<&'static Regex> {
    static BLANK: OnceLock<Option<Regex>> = OnceLock::new();
    BLANK.get_or_init(|| Regex::new(r"\n[ \t]*\n").ok()).as_ref()
}

/// Split free text into steps: on `Step N:` markers when the text has
/// them, otherwise on blank lines.
pub fn split_steps(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let starts: Vec<usize> = step_marker()
        .map(|re| re.find_iter(text).map(|m| m.start()).collect())
        .unwrap_or_default();

    let pieces: Vec<&str> = if !starts.is_empty() {
        let mut bounds = starts;
        if bounds[0] != 0 {
            bounds.insert(0, 0);
        }
        bounds
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = bounds.get(i + 1).copied().unwrap_or(text.len());
                &text[start..end]
            })
            .collect()
    } else if let Some(re) = blank_line() {
        re.split(text).collect()
    } else {
        vec![text]
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number steps from 1, dropping empty ones
pub fn number_steps<I, S>(steps: I) -> Vec<ReasoningStep>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    steps
        .into_iter()
        .map(Into::into)
        .map(|s: String| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, text)| ReasoningStep { index: i + 1, text })
        .collect()
}
