//! JSON salvage from free-form model output.
//!
//! Small models wrap JSON in prose, code fences, or trailing chatter.
//! `extract_json` recovers the first balanced JSON value and falls back to
//! the widest `{`/`[` … `}`/`]` span. Failure is `None`, never a panic.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

/// Remove Markdown code-fence markers, keeping their contents.
fn strip_fences(text: &str) -> String {
    FENCE.replace_all(text, "$1").into_owned()
}

/// End (exclusive byte offset) of the first balanced span in `content`, which
/// starts with an opener. Closers pop the stack whenever it is non-empty; the
/// span completes when a matching closer empties it.
fn balanced_span_end(content: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    for (i, ch) in content.char_indices() {
        match ch {
            '{' | '[' => stack.push(ch),
            '}' | ']' => {
                let Some(opener) = stack.pop() else {
                    continue;
                };
                let matched = (opener == '{' && ch == '}') || (opener == '[' && ch == ']');
                if matched && stack.is_empty() {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first JSON object or array embedded in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }

    let text = strip_fences(text);
    let start = text.find(|c| c == '{' || c == '[')?;
    let content = &text[start..];

    if let Some(end) = balanced_span_end(content) {
        match serde_json::from_str(&content[..end]) {
            Ok(value) => return Some(value),
            Err(e) => tracing::debug!(error = %e, "Balanced span is not valid JSON"),
        }
    }

    let end = match (text.rfind('}'), text.rfind(']')) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return None,
    };
    if end <= start {
        return None;
    }

    serde_json::from_str(&text[start..=end]).ok()
}

/// Short description of a JSON value's kind, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// At most `max_chars` leading characters of `text`, for log fields.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
