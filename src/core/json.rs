//! Locating structured output inside free-form model answers.
//!
//! Models wrap JSON in markdown fences, preface it with prose, or follow it
//! with commentary. The first complete JSON value is what counts; trailing
//! text after it is ignored.

use serde_json::{Deserializer, Value};

/// Find the first well-formed JSON object in `text`, falling back to the
/// first well-formed array.
///
/// Fenced ```json blocks are tried before the raw text.
pub fn locate_json(text: &str) -> Option<Value> {
    for candidate in fenced_blocks(text).chain(std::iter::once(text)) {
        if let Some(value) = first_value_starting_with(candidate, '{') {
            return Some(value);
        }
    }
    for candidate in fenced_blocks(text).chain(std::iter::once(text)) {
        if let Some(value) = first_value_starting_with(candidate, '[') {
            return Some(value);
        }
    }
    None
}

/// Contents of ``` fenced blocks, in order
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```").skip(1).step_by(2).map(|block| {
        // Drop the info string ("json") on the opening line
        match block.split_once('\n') {
            Some((info, body)) if !info.trim_start().starts_with(['{', '[']) => body,
            _ => block,
        }
    })
}

fn first_value_starting_with(text: &str, open: char) -> Option<Value> {
    text.match_indices(open).find_map(|(start, _)| {
        let mut stream = Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    })
}
