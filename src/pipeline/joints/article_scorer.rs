//! Article scoring: entities + candidate titles -> ranked `ScoredArticle`s.
//!
//! Literal entity/alias title hits bypass the model and score
//! `EXACT_MATCH_SCORE`, so they always outrank model judgments. The rest are
//! rated 0-10 by one inference call; on any failure the candidates get a
//! uniform 5.0 in input order.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde_json::Value;

use super::extract::{extract_json, json_kind, preview};
use super::prompt::build_scoring_prompt;
use super::titles::fuzzy_match;
use super::types::{EntityInfo, ScoredArticle, EXACT_MATCH_SCORE, MAX_MODEL_SCORE};
use super::JointError;
use crate::config::JointConfig;
use crate::inference_service::{InferenceService, JointKind};

/// Score given to every candidate when model scoring fails.
pub const FALLBACK_SCORE: f32 = 5.0;

/// Keys under which models tend to nest the scored list.
const WRAPPER_KEYS: [&str; 4] = ["items", "scores", "results", "articles"];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)article\s+name|title\s+\d+|example\s+article").unwrap());

/// Titles a model copied from the prompt's format example rather than the list.
pub fn is_placeholder_title(title: &str) -> bool {
    PLACEHOLDER.is_match(title)
}

/// Candidates whose trimmed, case-folded title equals an entity name or alias.
/// Disambiguation pages never qualify.
pub fn exact_matches(entity_info: &EntityInfo, candidates: &[String]) -> Vec<ScoredArticle> {
    let names: HashSet<String> = entity_info
        .lookup_names()
        .iter()
        .map(|n| n.to_lowercase())
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    candidates
        .iter()
        .filter(|title| {
            let folded = title.trim().to_lowercase();
            !folded.contains("(disambiguation)") && names.contains(&folded)
        })
        .filter(|title| seen.insert(title.as_str()))
        .map(|title| ScoredArticle::new(title, EXACT_MATCH_SCORE))
        .collect()
}

fn score_of(item: &serde_json::Map<String, Value>) -> Option<f32> {
    let raw = match item.get("score") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        Some(_) => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some((raw as f32).clamp(0.0, MAX_MODEL_SCORE))
}

/// Parse a scoring response into articles resolved against `candidates`,
/// best first. Equal scores keep candidate input order; a title scored twice
/// keeps its best score.
pub fn parse_score_response(
    raw: &str,
    candidates: &[String],
) -> Result<Vec<ScoredArticle>, JointError> {
    let value = extract_json(raw)
        .ok_or_else(|| JointError::Parse("no JSON value in response".into()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = WRAPPER_KEYS
                .iter()
                .find(|k| matches!(map.get(**k), Some(Value::Array(_))))
                .ok_or_else(|| JointError::Parse("response is not a JSON array".into()))?;
            match map.remove(*key) {
                Some(Value::Array(items)) => items,
                _ => return Err(JointError::Parse("response is not a JSON array".into())),
            }
        }
        other => {
            return Err(JointError::Parse(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut scored: Vec<(usize, ScoredArticle)> = Vec::new();
    for item in &items {
        let Value::Object(item) = item else { continue };
        let Some(proposed) = item.get("title").and_then(Value::as_str) else {
            continue;
        };
        let Some(score) = score_of(item) else {
            tracing::debug!(joint = "article_scorer", title = proposed, "Dropping unparseable score");
            continue;
        };

        let matched = if candidates.iter().any(|c| c == proposed) {
            proposed
        } else {
            match fuzzy_match(proposed, candidates) {
                Some(title) => title,
                None => {
                    tracing::debug!(joint = "article_scorer", title = proposed, "Dropping unmatched title");
                    continue;
                }
            }
        };

        if is_placeholder_title(matched) {
            tracing::debug!(joint = "article_scorer", title = matched, "Dropping placeholder title");
            continue;
        }

        let position = candidates
            .iter()
            .position(|c| c == matched)
            .unwrap_or(candidates.len());
        scored.push((position, ScoredArticle::new(matched, score)));
    }

    scored.sort_by(|(pa, a), (pb, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(pa.cmp(pb))
    });

    let mut seen: HashSet<String> = HashSet::new();
    Ok(scored
        .into_iter()
        .map(|(_, article)| article)
        .filter(|article| seen.insert(article.title.clone()))
        .collect())
}

fn uniform_fallback(
    exact: Vec<ScoredArticle>,
    candidates: &[String],
    top_k: usize,
) -> Vec<ScoredArticle> {
    let exact_titles: HashSet<String> = exact.iter().map(|a| a.title.clone()).collect();
    exact
        .into_iter()
        .chain(
            candidates
                .iter()
                .filter(|t| !exact_titles.contains(t.as_str()))
                .map(|t| ScoredArticle::new(t, FALLBACK_SCORE)),
        )
        .take(top_k)
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Joint
// ═══════════════════════════════════════════════════════════

pub struct ArticleScorerJoint<'a> {
    service: &'a InferenceService,
    config: JointConfig,
}

impl<'a> ArticleScorerJoint<'a> {
    pub fn new(service: &'a InferenceService, config: JointConfig) -> Self {
        tracing::debug!(model = %config.model, "Article scorer initialized");
        Self { service, config }
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// Rank `candidate_titles` for `query`. Returns at most `top_k` articles,
    /// exact entity matches first. Never fails.
    pub fn score(
        &self,
        query: &str,
        entity_info: &EntityInfo,
        candidate_titles: &[String],
        top_k: usize,
    ) -> Vec<ScoredArticle> {
        if candidate_titles.is_empty() {
            tracing::debug!(joint = "article_scorer", "No articles to score");
            return Vec::new();
        }

        let started = Instant::now();
        let exact = exact_matches(entity_info, candidate_titles);
        let exact_titles: HashSet<&str> = exact.iter().map(|a| a.title.as_str()).collect();
        let remaining: Vec<&str> = candidate_titles
            .iter()
            .map(String::as_str)
            .filter(|t| !exact_titles.contains(t))
            .collect();

        tracing::debug!(
            joint = "article_scorer",
            candidates = candidate_titles.len(),
            exact_matches = exact.len(),
            "Exact-match pass complete"
        );

        if remaining.is_empty() {
            return exact.into_iter().take(top_k).collect();
        }

        match self.score_with_model(query, entity_info, &remaining, candidate_titles) {
            Ok(scored) => {
                let mut ranked = exact.clone();
                ranked.extend(
                    scored
                        .into_iter()
                        .filter(|a| !exact_titles.contains(a.title.as_str())),
                );
                ranked.truncate(top_k);
                tracing::info!(
                    joint = "article_scorer",
                    returned = ranked.len(),
                    top = ranked.first().map(|a| a.title.as_str()).unwrap_or(""),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Articles scored"
                );
                ranked
            }
            Err(e) => {
                tracing::warn!(
                    joint = "article_scorer",
                    error = %e,
                    "Scoring failed, using uniform scores"
                );
                uniform_fallback(exact, candidate_titles, top_k)
            }
        }
    }

    fn score_with_model(
        &self,
        query: &str,
        entity_info: &EntityInfo,
        listed: &[&str],
        candidates: &[String],
    ) -> Result<Vec<ScoredArticle>, JointError> {
        let prompt = build_scoring_prompt(query, &entity_info.entity_names(), listed);
        let response = self.service.complete(
            JointKind::ArticleScoring,
            &self.config.model,
            &prompt,
            self.config.temperature,
            self.config.timeout_secs,
            true,
        )?;
        tracing::debug!(
            joint = "article_scorer",
            response = preview(&response, 200),
            "Raw scoring response"
        );
        parse_score_response(&response, candidates)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::inference::{InferenceError, InferenceSettings, MockLlmClient};
    use crate::pipeline::joints::types::{Entity, EntityType};

    fn service(mock: &Arc<MockLlmClient>) -> InferenceService {
        InferenceService::start(Box::new(Arc::clone(mock)), InferenceSettings::default())
    }

    fn config() -> JointConfig {
        JointConfig::new("qwen2.5:0.5b", 0.0).unwrap()
    }

    fn titles(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn python_info() -> EntityInfo {
        EntityInfo {
            is_comparison: false,
            entities: vec![
                Entity::new("Python (programming language)", EntityType::Technology)
                    .with_aliases(&["Python"]),
                Entity::new("creator of Python", EntityType::Person),
            ],
            action: "identify the creator".into(),
            answer_type: None,
            comparison_dimension: None,
        }
    }

    fn ranked(articles: &[ScoredArticle]) -> Vec<(&str, f32)> {
        articles.iter().map(|a| (a.title.as_str(), a.score)).collect()
    }

    #[test]
    fn exact_match_outranks_model_scores() {
        let mock = Arc::new(MockLlmClient::new(
            r#"[{"title": "Guido van Rossum", "score": 10}, {"title": "Python (programming language)", "score": 3}, {"title": "Monty Python", "score": 2}]"#,
        ));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["Monty Python", "Python (programming language)", "Guido van Rossum"]);

        let result = joint.score("Who created Python?", &python_info(), &candidates, 5);
        assert_eq!(
            ranked(&result),
            vec![
                ("Python (programming language)", 11.0),
                ("Guido van Rossum", 10.0),
                ("Monty Python", 2.0),
            ]
        );
        assert!(result[0].is_exact_match());
        assert!(result[1..].iter().all(|a| a.score < result[0].score));
    }

    #[test]
    fn exact_match_is_case_and_whitespace_insensitive() {
        let info = EntityInfo::fallback("python");
        let candidates = titles(&["  PYTHON ", "Python (disambiguation)"]);
        let exact = exact_matches(&info, &candidates);
        assert_eq!(ranked(&exact), vec![("  PYTHON ", 11.0)]);
    }

    #[test]
    fn disambiguation_pages_never_override() {
        let info = EntityInfo::fallback("Mercury (disambiguation)");
        let candidates = titles(&["Mercury (disambiguation)"]);
        assert!(exact_matches(&info, &candidates).is_empty());
    }

    #[test]
    fn empty_candidates_make_no_call() {
        let mock = Arc::new(MockLlmClient::new("[]"));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        assert!(joint.score("q", &python_info(), &[], 5).is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn all_exact_candidates_make_no_call() {
        let mock = Arc::new(MockLlmClient::new("[]"));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["Python", "Python (programming language)"]);
        let result = joint.score("q", &python_info(), &candidates, 5);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(ScoredArticle::is_exact_match));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn prompt_lists_only_non_exact_candidates() {
        let mock = Arc::new(MockLlmClient::new("[]"));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["Python (programming language)", "Guido van Rossum"]);
        joint.score("Who created Python?", &python_info(), &candidates, 5);

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("1. Guido van Rossum"));
        assert!(!prompt.contains(". Python (programming language)"));
        assert!(prompt.contains("'creator of Python'"));
    }

    #[test]
    fn output_never_exceeds_top_k() {
        let mock = Arc::new(MockLlmClient::new(
            r#"[{"title": "A", "score": 9}, {"title": "B", "score": 8}, {"title": "C", "score": 7}]"#,
        ));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["A", "B", "C"]);
        assert_eq!(joint.score("q", &python_info(), &candidates, 2).len(), 2);
        assert!(joint.score("q", &python_info(), &candidates, 0).is_empty());
    }

    #[test]
    fn inference_failure_uses_uniform_scores_after_exact_matches() {
        let mock = Arc::new(MockLlmClient::failing(InferenceError::Timeout { secs: 30 }));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["Monty Python", "Guido van Rossum", "Python", "ABC (language)"]);

        let result = joint.score("Who created Python?", &python_info(), &candidates, 3);
        assert_eq!(
            ranked(&result),
            vec![("Python", 11.0), ("Monty Python", 5.0), ("Guido van Rossum", 5.0)]
        );
    }

    #[test]
    fn non_list_response_uses_uniform_scores() {
        let mock = Arc::new(MockLlmClient::new(r#"{"verdict": "all good"}"#));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["A", "B"]);
        let result = joint.score("q", &EntityInfo::fallback("zzz"), &candidates, 5);
        assert_eq!(ranked(&result), vec![("A", 5.0), ("B", 5.0)]);
    }

    #[test]
    fn wrapped_list_is_unwrapped() {
        let candidates = titles(&["Alan Turing", "Enigma machine"]);
        let raw = r#"{"results": [{"title": "Enigma machine", "score": 6}, {"title": "Alan Turing", "score": 9}]}"#;
        let result = parse_score_response(raw, &candidates).unwrap();
        assert_eq!(ranked(&result), vec![("Alan Turing", 9.0), ("Enigma machine", 6.0)]);
    }

    #[test]
    fn titles_resolve_fuzzily_and_unknowns_drop() {
        let candidates = titles(&["Guido van Rossum", "History of Python"]);
        let raw = r#"[{"title": "guido van rossum.", "score": 9}, {"title": "Linus Torvalds", "score": 8}, {"title": "Python", "score": 4}]"#;
        let result = parse_score_response(raw, &candidates).unwrap();
        assert_eq!(
            ranked(&result),
            vec![("Guido van Rossum", 9.0), ("History of Python", 4.0)]
        );
    }

    #[test]
    fn placeholder_titles_are_discarded() {
        let candidates = titles(&["Example Article Collection", "Real Title"]);
        let raw = r#"[{"title": "Example Article Collection", "score": 10}, {"title": "Real Title", "score": 1}]"#;
        let result = parse_score_response(raw, &candidates).unwrap();
        assert_eq!(ranked(&result), vec![("Real Title", 1.0)]);
        assert!(is_placeholder_title("Title 3"));
        assert!(is_placeholder_title("article  name"));
        assert!(!is_placeholder_title("Articles of Confederation"));
    }

    #[test]
    fn equal_scores_keep_candidate_order() {
        let candidates = titles(&["First", "Second", "Third"]);
        let raw = r#"[{"title": "Third", "score": 7}, {"title": "Second", "score": 7}, {"title": "First", "score": 7}]"#;
        let result = parse_score_response(raw, &candidates).unwrap();
        assert_eq!(
            ranked(&result),
            vec![("First", 7.0), ("Second", 7.0), ("Third", 7.0)]
        );
    }

    #[test]
    fn scores_are_clamped_and_coerced() {
        let candidates = titles(&["A", "B", "C", "D", "E"]);
        let raw = r#"[{"title": "A", "score": "8"}, {"title": "B", "score": 15}, {"title": "C", "score": -2}, {"title": "D"}, {"title": "E", "score": "high"}]"#;
        let result = parse_score_response(raw, &candidates).unwrap();
        assert_eq!(
            ranked(&result),
            vec![("B", 10.0), ("A", 8.0), ("C", 0.0), ("D", 0.0)]
        );
    }

    #[test]
    fn duplicate_items_keep_best_score() {
        let candidates = titles(&["A", "B"]);
        let raw = r#"[{"title": "A", "score": 2}, {"title": "B", "score": 5}, {"title": "A", "score": 9}]"#;
        let result = parse_score_response(raw, &candidates).unwrap();
        assert_eq!(ranked(&result), vec![("A", 9.0), ("B", 5.0)]);
    }

    #[test]
    fn model_duplicate_of_exact_match_is_dropped() {
        let mock = Arc::new(MockLlmClient::new(
            r#"[{"title": "Python", "score": 10}, {"title": "Monty Python", "score": 4}]"#,
        ));
        let service = service(&mock);
        let joint = ArticleScorerJoint::new(&service, config());
        let candidates = titles(&["Python", "Monty Python"]);
        let result = joint.score("q", &python_info(), &candidates, 5);
        assert_eq!(ranked(&result), vec![("Python", 11.0), ("Monty Python", 4.0)]);
    }

    #[test]
    fn unparseable_response_is_parse_error() {
        assert!(matches!(
            parse_score_response("no idea", &titles(&["A"])),
            Err(JointError::Parse(_))
        ));
        assert!(matches!(
            parse_score_response(r#"{"scores": "A=9"}"#, &titles(&["A"])),
            Err(JointError::Parse(_))
        ));
    }
}
