//! Multi-hop resolution of indirect references such as "creator of Python".
//!
//! Extension point: detection and resolution are not implemented, so the
//! resolver issues no inference call and holds no service handle. Nothing is
//! detected and nothing resolves.

use super::types::{EntityInfo, IndirectReference};
use crate::config::JointConfig;

pub struct MultiHopResolver {
    config: JointConfig,
}

impl MultiHopResolver {
    pub fn new(config: JointConfig) -> Self {
        tracing::debug!(model = %config.model, "Multi-hop resolver initialized");
        Self { config }
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// Entities of `entity_info` that are unresolved placeholders.
    pub fn detect_indirect_references(&self, entity_info: &EntityInfo) -> Vec<IndirectReference> {
        tracing::debug!(
            joint = "multi_hop",
            entities = entity_info.entities.len(),
            "Indirect reference detection not available"
        );
        Vec::new()
    }

    /// The concrete name `reference` points to, read from `article_text`.
    pub fn resolve_indirect_reference(
        &self,
        reference: &IndirectReference,
        article_text: &str,
    ) -> Option<String> {
        tracing::debug!(
            joint = "multi_hop",
            placeholder = %reference.placeholder,
            text_len = article_text.len(),
            "Indirect reference resolution not available"
        );
        None
    }
}
