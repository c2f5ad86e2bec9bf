//! Comparison synthesis: one value per entity along a comparison dimension.
//!
//! Extension point: value extraction is not implemented, so the joint issues
//! no inference call and holds no service handle. Every entity maps to
//! `UNKNOWN_VALUE`; callers should treat the result as a placeholder.

use std::collections::BTreeMap;

use super::types::{Chunk, ComparisonDimension};
use crate::config::JointConfig;

pub const UNKNOWN_VALUE: &str = "Unknown";

pub struct ComparisonJoint {
    config: JointConfig,
}

impl ComparisonJoint {
    pub fn new(config: JointConfig) -> Self {
        tracing::debug!(model = %config.model, "Comparison joint initialized");
        Self { config }
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// Map each distinct, non-blank entity name to its value for `dimension`.
    pub fn synthesize_comparison(
        &self,
        query: &str,
        entities: &[String],
        dimension: Option<ComparisonDimension>,
        chunks: &[Chunk],
    ) -> BTreeMap<String, String> {
        tracing::debug!(
            joint = "comparison",
            query_len = query.len(),
            entities = entities.len(),
            dimension = ?dimension,
            chunks = chunks.len(),
            "Comparison values not extracted"
        );
        entities
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(|e| (e.to_string(), UNKNOWN_VALUE.to_string()))
            .collect()
    }
}
