//! Fact refinement: pull a handful of atomic facts out of one passage.

use serde_json::Value;

use super::extract::{extract_json, json_kind};
use super::prompt::build_facts_prompt;
use super::types::{PremiseStatus, PremiseVerdict};
use super::JointError;
use crate::config::JointConfig;
use crate::inference_service::{InferenceService, JointKind};

const SUPPORTED_REASON: &str = "Text content supports the query topic.";

/// Parse a JSON list of fact strings, keeping the non-blank ones.
pub fn parse_facts_response(raw: &str) -> Result<Vec<String>, JointError> {
    let value = extract_json(raw)
        .ok_or_else(|| JointError::Parse("no JSON value in response".into()))?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect()),
        other => Err(JointError::Parse(format!(
            "expected a JSON list, got {}",
            json_kind(&other)
        ))),
    }
}

pub struct FactRefinementJoint<'a> {
    service: &'a InferenceService,
    config: JointConfig,
}

impl<'a> FactRefinementJoint<'a> {
    pub fn new(service: &'a InferenceService, config: JointConfig) -> Self {
        tracing::debug!(model = %config.model, "Fact refinement initialized");
        Self { service, config }
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// 3-5 facts from `text` that bear on `query`. Empty on any failure.
    pub fn refine_facts(&self, query: &str, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let prompt = build_facts_prompt(query, text);
        let result = self
            .service
            .complete(
                JointKind::FactRefinement,
                &self.config.model,
                &prompt,
                self.config.temperature,
                self.config.timeout_secs,
                true,
            )
            .map_err(JointError::from)
            .and_then(|response| parse_facts_response(&response));

        match result {
            Ok(facts) => {
                tracing::debug!(joint = "fact_refinement", facts = facts.len(), "Facts extracted");
                facts
            }
            Err(e) => {
                tracing::warn!(joint = "fact_refinement", error = %e, "Fact refinement failed");
                Vec::new()
            }
        }
    }

    /// Whether `text` supports the premise implied by `query`.
    ///
    /// Fixed policy for now: every premise is reported as supported.
    pub fn verify_premise(&self, query: &str, text: &str) -> PremiseVerdict {
        tracing::debug!(
            joint = "fact_refinement",
            query_len = query.len(),
            text_len = text.len(),
            "Premise check uses fixed policy"
        );
        PremiseVerdict {
            status: PremiseStatus::Supported,
            reason: SUPPORTED_REASON.to_string(),
        }
    }
}
