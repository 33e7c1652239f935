//! Extraction of a structured payload from free-form model output
//!
//! Model replies are untrusted text: the JSON object we want may be wrapped in
//! markdown fences or surrounded by commentary. `parse_structured_result`
//! strips fences, then walks every `{` and keeps the first span that is a
//! well-formed JSON object.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

lazy_static! {
    /// Fenced code block, optionally tagged `json`
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```")
        .expect("Failed to compile CODE_FENCE regex - this is a bug in the hardcoded pattern");
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("model output was empty")]
    Empty,

    #[error("no well-formed JSON object found in model output")]
    NoObject,

    #[error("JSON object does not match the expected structure: {0}")]
    Schema(#[source] serde_json::Error),

    #[error("structured output failed validation: {0}")]
    Invalid(String),
}

/// Return the end offset (exclusive) of the balanced object starting at `start`,
/// honouring string literals and escapes.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// First well-formed JSON object in `text`
fn first_object(text: &str) -> Option<serde_json::Value> {
    for (start, _) in text.match_indices('{') {
        let Some(end) = balanced_object_end(text, start) else {
            continue;
        };
        if let Ok(value @ serde_json::Value::Object(_)) =
            serde_json::from_str::<serde_json::Value>(&text[start..end])
        {
            return Some(value);
        }
    }
    None
}

/// Locate the JSON object embedded in `text` without interpreting it
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    // Fenced blocks take precedence over loose objects in the surrounding prose
    for captures in CODE_FENCE.captures_iter(text) {
        if let Some(value) = captures.get(1).and_then(|m| first_object(m.as_str())) {
            return Ok(value);
        }
    }

    first_object(text).ok_or(ParseError::NoObject)
}

/// Parse model output into `T`
pub fn parse_structured_result<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let value = extract_json_object(text)?;
    serde_json::from_value(value).map_err(ParseError::Schema)
}
