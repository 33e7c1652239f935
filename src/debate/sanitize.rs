//! Cleaning of text that is re-injected into prompts
//!
//! Company names come from ingested tables and every earlier stage reply is
//! model output; both are untrusted before they reach the next prompt.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Role markers and instruction phrases that could hijack a prompt
    static ref INJECTION_PATTERNS: Regex = Regex::new(
        r"(?i)(ignore\s+(all\s+)?previous|system:|assistant:|user:|<\|.*?\|>|```|human:|forget\s+all|disregard|new\s+instructions?)"
    ).expect("Failed to compile INJECTION_PATTERNS regex - this is a bug in the hardcoded pattern");

    /// Long runs of structural characters
    static ref EXCESSIVE_SPECIAL_CHARS: Regex = Regex::new(r"[{}\[\]<>]{5,}")
        .expect("Failed to compile EXCESSIVE_SPECIAL_CHARS regex - this is a bug in the hardcoded pattern");
}

/// Strip injection markers, collapse whitespace and cap at `max_chars` characters
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let filtered = INJECTION_PATTERNS.replace_all(input, "[filtered]");
    let filtered = EXCESSIVE_SPECIAL_CHARS.replace_all(&filtered, "[chars]");
    let normalized = filtered.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.chars().count() <= max_chars {
        return normalized;
    }

    let mut truncated: String = normalized.chars().take(max_chars.saturating_sub(3)).collect();
    if let Some(pos) = truncated.rfind(char::is_whitespace) {
        truncated.truncate(pos);
    }
    truncated.push_str("...");
    truncated
}

/// Company names are short
pub fn sanitize_name(name: &str) -> String {
    sanitize_text(name, 120)
}

/// Earlier stage output quoted in a later prompt
pub fn sanitize_argument(text: &str) -> String {
    sanitize_text(text, 1500)
}
