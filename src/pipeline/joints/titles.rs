//! Title normalization and fuzzy reconciliation against a candidate set.

use std::sync::LazyLock;

use regex::Regex;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[,.:;'"-]+"#).unwrap());

/// Lowercase, drop `, . : ; ' " -`, trim.
pub fn normalize(title: &str) -> String {
    PUNCTUATION
        .replace_all(&title.to_lowercase(), "")
        .trim()
        .to_string()
}

/// Resolve a model-proposed title to one of `valid_titles`.
///
/// Exact normalized equality wins over containment; within each pass the
/// first candidate in input order is taken.
pub fn fuzzy_match<'a, S: AsRef<str>>(candidate: &str, valid_titles: &'a [S]) -> Option<&'a str> {
    let wanted = normalize(candidate);
    if wanted.is_empty() {
        return None;
    }

    let normalized: Vec<(&'a str, String)> = valid_titles
        .iter()
        .map(|t| (t.as_ref(), normalize(t.as_ref())))
        .filter(|(_, n)| !n.is_empty())
        .collect();

    if let Some((title, _)) = normalized.iter().find(|(_, n)| *n == wanted) {
        return Some(*title);
    }

    normalized
        .iter()
        .find(|(_, n)| n.contains(&wanted) || wanted.contains(n.as_str()))
        .map(|(title, _)| *title)
}
