//! Chunk filtering: keep the passages most worth handing to answer synthesis.
//!
//! Comparison queries with two or more entities take the diversity path:
//! round-robin over per-entity queues, no inference. Everything else is rated
//! by the model; on failure the first `top_k` chunks pass through unscored.

use std::cmp::Ordering;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{extract_json, json_kind, preview};
use super::prompt::{build_chunk_filter_prompt, MAX_FILTER_CHUNKS};
use super::types::{AnswerType, Chunk, EntityInfo, MAX_MODEL_SCORE};
use super::JointError;
use crate::config::JointConfig;
use crate::inference_service::{InferenceService, JointKind};

/// How the relevance prompt should weigh chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterMode {
    /// The query asks for one specific fact.
    #[default]
    Factual,
    /// The query asks for background or an overview.
    Exploratory,
}

/// Optional inputs to `ChunkFilterJoint::filter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions<'e> {
    pub entity_info: Option<&'e EntityInfo>,
    pub mode: FilterMode,
    pub answer_type: Option<AnswerType>,
}

impl<'e> FilterOptions<'e> {
    /// Options carrying the entities and answer type of an extraction result.
    pub fn for_entities(entity_info: &'e EntityInfo) -> Self {
        Self {
            entity_info: Some(entity_info),
            mode: FilterMode::default(),
            answer_type: entity_info.answer_type,
        }
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Diversity path
// ═══════════════════════════════════════════════════════════

/// Round-robin selection across entities.
///
/// Each chunk joins the queue of the first entity whose lower-cased name
/// occurs in its lower-cased title; chunks matching no entity are dropped.
/// Selection stops at `top_k` or when a full round adds nothing.
pub fn diversity_select(chunks: &[Chunk], entity_names: &[String], top_k: usize) -> Vec<Chunk> {
    let mut names: Vec<String> = Vec::new();
    for name in entity_names {
        let name = name.trim().to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }

    let mut queues: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    for (i, chunk) in chunks.iter().enumerate() {
        let title = chunk.metadata.title.to_lowercase();
        if let Some(slot) = names.iter().position(|n| title.contains(n.as_str())) {
            queues[slot].push(i);
        }
    }

    let mut cursors = vec![0usize; queues.len()];
    let mut selected: Vec<Chunk> = Vec::with_capacity(top_k.min(chunks.len()));
    while selected.len() < top_k {
        let mut added = false;
        for (queue, cursor) in queues.iter().zip(cursors.iter_mut()) {
            if selected.len() >= top_k {
                break;
            }
            if let Some(&index) = queue.get(*cursor) {
                selected.push(chunks[index].clone());
                *cursor += 1;
                added = true;
            }
        }
        if !added {
            break;
        }
    }
    selected
}

// ═══════════════════════════════════════════════════════════
// Relevance path
// ═══════════════════════════════════════════════════════════

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse `[{"id": n, "score": s}, ...]` into `(index, score)` pairs.
///
/// Ids are 1-based over the `presented` chunks; out-of-range, repeated, or
/// non-numeric entries are skipped. A list with no valid pair means nothing
/// was relevant and yields an empty selection.
pub fn parse_filter_response(raw: &str, presented: usize) -> Result<Vec<(usize, f32)>, JointError> {
    let value = extract_json(raw)
        .ok_or_else(|| JointError::Parse("no JSON value in response".into()))?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(JointError::Parse(format!(
                "expected a JSON list, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut pairs: Vec<(usize, f32)> = Vec::new();
    for item in &items {
        let Value::Object(item) = item else { continue };
        let Some(id) = as_number(item.get("id")) else { continue };
        let Some(score) = as_number(item.get("score")).filter(|s| !s.is_nan()) else {
            continue;
        };
        if id.fract() != 0.0 || id < 1.0 || id > presented as f64 {
            continue;
        }
        let index = id as usize - 1;
        if pairs.iter().any(|(seen, _)| *seen == index) {
            continue;
        }
        pairs.push((index, (score as f32).clamp(0.0, MAX_MODEL_SCORE)));
    }

    Ok(pairs)
}

// ═══════════════════════════════════════════════════════════
// Joint
// ═══════════════════════════════════════════════════════════

pub struct ChunkFilterJoint<'a> {
    service: &'a InferenceService,
    config: JointConfig,
}

impl<'a> ChunkFilterJoint<'a> {
    pub fn new(service: &'a InferenceService, config: JointConfig) -> Self {
        tracing::debug!(model = %config.model, "Chunk filter initialized");
        Self { service, config }
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// Select at most `top_k` chunks for `query`. Never fails.
    pub fn filter(
        &self,
        query: &str,
        chunks: &[Chunk],
        top_k: usize,
        options: &FilterOptions<'_>,
    ) -> Vec<Chunk> {
        if chunks.is_empty() {
            return Vec::new();
        }

        if let Some(info) = options.entity_info.filter(|i| i.is_multi_entity_comparison()) {
            let names: Vec<String> = info.entities.iter().map(|e| e.name.clone()).collect();
            let selected = diversity_select(chunks, &names, top_k);
            tracing::info!(
                joint = "chunk_filter",
                path = "diversity",
                input = chunks.len(),
                selected = selected.len(),
                "Chunks selected"
            );
            return selected;
        }

        let started = Instant::now();
        match self.rank_with_model(query, chunks, options) {
            Ok(mut ranked) => {
                ranked.truncate(top_k);
                tracing::info!(
                    joint = "chunk_filter",
                    path = "relevance",
                    input = chunks.len(),
                    selected = ranked.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Chunks selected"
                );
                ranked
            }
            Err(e) => {
                tracing::warn!(
                    joint = "chunk_filter",
                    error = %e,
                    "Filtering failed, passing chunks through"
                );
                chunks.iter().take(top_k).cloned().collect()
            }
        }
    }

    fn rank_with_model(
        &self,
        query: &str,
        chunks: &[Chunk],
        options: &FilterOptions<'_>,
    ) -> Result<Vec<Chunk>, JointError> {
        let prompt = build_chunk_filter_prompt(query, chunks, options.mode, options.answer_type);
        let response = self.service.complete(
            JointKind::ChunkFiltering,
            &self.config.model,
            &prompt,
            self.config.temperature,
            self.config.timeout_secs,
            true,
        )?;
        tracing::debug!(
            joint = "chunk_filter",
            response = preview(&response, 200),
            "Raw filter response"
        );

        let mut pairs = parse_filter_response(&response, chunks.len().min(MAX_FILTER_CHUNKS))?;
        pairs.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa).unwrap_or(Ordering::Equal).then(ia.cmp(ib))
        });

        Ok(pairs
            .into_iter()
            .map(|(index, score)| {
                let mut chunk = chunks[index].clone();
                chunk.filter_score = Some(score);
                chunk
            })
            .collect())
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
        JointConfig::new("llama3.2:1b", 0.1).unwrap()
    }

    fn chunk(title: &str, text: &str) -> Chunk {
        Chunk::new(title, text)
    }

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn comparison(names: &[&str]) -> EntityInfo {
        EntityInfo {
            is_comparison: true,
            entities: names.iter().map(|n| Entity::new(n, EntityType::Person)).collect(),
            action: "compare".into(),
            answer_type: None,
            comparison_dimension: None,
        }
    }

    #[test]
    fn empty_input_makes_no_call() {
        let mock = Arc::new(MockLlmClient::new("[]"));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        assert!(joint.filter("q", &[], 5, &FilterOptions::default()).is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn diversity_interleaves_round_robin() {
        let mock = Arc::new(MockLlmClient::new("[]"));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        let chunks = vec![
            chunk("A", "A1"),
            chunk("A", "A2"),
            chunk("A", "A3"),
            chunk("B", "B1"),
            chunk("B", "B2"),
            chunk("B", "B3"),
        ];
        let info = comparison(&["A", "B"]);

        let selected = joint.filter("A vs B", &chunks, 4, &FilterOptions::for_entities(&info));
        assert_eq!(texts(&selected), vec!["A1", "B1", "A2", "B2"]);
        assert!(selected.iter().all(|c| c.filter_score.is_none()));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn diversity_stops_when_queues_run_dry() {
        let chunks = vec![
            chunk("Nikola Tesla", "T1"),
            chunk("Thomas Edison", "E1"),
            chunk("Nikola Tesla", "T2"),
            chunk("Electricity", "unrelated"),
        ];
        let names = vec!["Nikola Tesla".to_string(), "Thomas Edison".to_string()];
        assert_eq!(texts(&diversity_select(&chunks, &names, 10)), vec!["T1", "E1", "T2"]);
    }

    #[test]
    fn diversity_assigns_chunk_to_first_matching_entity() {
        let chunks = vec![chunk("Tesla and Edison rivalry", "both"), chunk("Edison", "E1")];
        let names = vec!["Tesla".to_string(), "Edison".to_string()];
        assert_eq!(texts(&diversity_select(&chunks, &names, 4)), vec!["both", "E1"]);
    }

    #[test]
    fn single_entity_comparison_uses_relevance_path() {
        let mock = Arc::new(MockLlmClient::new(r#"[{"id": 2, "score": 9}]"#));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        let chunks = vec![chunk("A", "first"), chunk("A", "second")];
        let info = comparison(&["A"]);

        let selected = joint.filter("q", &chunks, 5, &FilterOptions::for_entities(&info));
        assert_eq!(texts(&selected), vec!["second"]);
        assert_eq!(selected[0].filter_score, Some(9.0));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn relevance_ranks_and_annotates() {
        let mock = Arc::new(MockLlmClient::new(
            r#"Here: [{"id": 1, "score": 3}, {"id": 2, "score": 9}, {"id": 3, "score": "7"}]"#,
        ));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        let chunks = vec![chunk("T", "low"), chunk("T", "high"), chunk("T", "mid")];

        let selected = joint.filter("q", &chunks, 2, &FilterOptions::default());
        assert_eq!(texts(&selected), vec!["high", "mid"]);
        assert_eq!(selected[0].filter_score, Some(9.0));
        assert_eq!(selected[1].filter_score, Some(7.0));
        assert!(chunks.iter().all(|c| c.filter_score.is_none()));
    }

    #[test]
    fn relevance_ties_keep_input_order() {
        let pairs = parse_filter_response(
            r#"[{"id": 3, "score": 5}, {"id": 1, "score": 5}, {"id": 2, "score": 8}]"#,
            3,
        )
        .unwrap();
        assert_eq!(pairs, vec![(2, 5.0), (0, 5.0), (1, 8.0)]);

        let mock = Arc::new(MockLlmClient::new(
            r#"[{"id": 3, "score": 5}, {"id": 1, "score": 5}, {"id": 2, "score": 8}]"#,
        ));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        let chunks = vec![chunk("T", "one"), chunk("T", "two"), chunk("T", "three")];
        let selected = joint.filter("q", &chunks, 5, &FilterOptions::default());
        assert_eq!(texts(&selected), vec!["two", "one", "three"]);
    }

    #[test]
    fn invalid_ids_are_skipped() {
        let pairs = parse_filter_response(
            r#"[{"id": 0, "score": 9}, {"id": 4, "score": 9}, {"id": 1.5, "score": 9}, {"id": 2, "score": 6}, {"id": 2, "score": 10}, {"score": 8}, "junk"]"#,
            3,
        )
        .unwrap();
        assert_eq!(pairs, vec![(1, 6.0)]);
    }

    #[test]
    fn ids_beyond_presented_chunks_are_ignored() {
        let mock = Arc::new(MockLlmClient::new(
            r#"[{"id": 16, "score": 10}, {"id": 15, "score": 4}]"#,
        ));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        let chunks: Vec<Chunk> = (1..=20).map(|i| chunk("T", &format!("c{i}"))).collect();

        let selected = joint.filter("q", &chunks, 5, &FilterOptions::default());
        assert_eq!(texts(&selected), vec!["c15"]);
    }

    #[test]
    fn failure_passes_first_chunks_through() {
        let chunks = vec![chunk("T", "a"), chunk("T", "b"), chunk("T", "c")];
        for response in [
            Err(InferenceError::EmptyResponse),
            Ok("I rate them all highly".to_string()),
            Ok(r#"{"id": 1, "score": 9}"#.to_string()),
        ] {
            let mock = Arc::new(MockLlmClient::scripted(vec![response]));
            let service = service(&mock);
            let joint = ChunkFilterJoint::new(&service, config());
            let selected = joint.filter("q", &chunks, 2, &FilterOptions::default());
            assert_eq!(texts(&selected), vec!["a", "b"]);
            assert!(selected.iter().all(|c| c.filter_score.is_none()));
        }
    }

    #[test]
    fn no_valid_scores_selects_nothing() {
        let chunks = vec![chunk("T", "a"), chunk("T", "b")];
        for response in ["[]", r#"[{"id": 9, "score": 9}]"#, r#"Sure: [{"score": 7}]"#] {
            let mock = Arc::new(MockLlmClient::new(response));
            let service = service(&mock);
            let joint = ChunkFilterJoint::new(&service, config());
            assert!(joint.filter("q", &chunks, 5, &FilterOptions::default()).is_empty());
            assert_eq!(mock.call_count(), 1);
        }
        assert_eq!(parse_filter_response("[]", 2).unwrap(), vec![]);
    }

    #[test]
    fn prompt_reflects_mode_and_answer_type() {
        let mock = Arc::new(MockLlmClient::new("[]"));
        let service = service(&mock);
        let joint = ChunkFilterJoint::new(&service, config());
        let mut info = EntityInfo::fallback("Where was Turing born?");
        info.answer_type = Some(AnswerType::Birthplace);
        let options = FilterOptions::for_entities(&info).with_mode(FilterMode::Exploratory);

        joint.filter("Where was Turing born?", &[chunk("Alan Turing", "text")], 3, &options);
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("birthplace"));
        assert!(prompt.contains("broad background"));
    }

    #[test]
    fn filter_mode_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&FilterMode::Factual).unwrap(), "\"FACTUAL\"");
        let mode: FilterMode = serde_json::from_str("\"EXPLORATORY\"").unwrap();
        assert_eq!(mode, FilterMode::Exploratory);
    }
}
