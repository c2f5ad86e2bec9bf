//! Entity extraction: query -> `EntityInfo`.
//!
//! The model may answer in the current multi-entity shape or in the legacy
//! single-entity shape (`entity` / `entity_type` / `aliases`). Both are
//! recognised at the parse boundary and normalized into one `EntityInfo`;
//! nothing downstream sees the legacy shape.

use std::time::Instant;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::extract::{extract_json, json_kind, preview};
use super::prompt::{build_entity_prompt, build_expansion_prompt};
use super::types::{AnswerType, ComparisonDimension, Entity, EntityInfo, EntityType};
use super::JointError;
use crate::config::{JointConfig, DEFAULT_EXPANSION_TEMPERATURE};
use crate::inference_service::{InferenceService, JointKind};

/// Upper bound on alternative phrasings returned by `suggest_expansion`.
pub const MAX_EXPANSIONS: usize = 3;

const DEFAULT_ACTION: &str = "information";

// ═══════════════════════════════════════════════════════════
// Response shapes
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentShape {
    entities: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_comparison: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    action: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    answer_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    comparison_dimension: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyShape {
    #[serde(default, deserialize_with = "lenient_string")]
    entity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    aliases: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    action: Option<String>,
}

/// Entity response as the model sent it.
#[derive(Debug)]
enum EntityResponse {
    Current(CurrentShape),
    Legacy(LegacyShape),
}

impl EntityResponse {
    fn from_value(value: Value) -> Result<Self, JointError> {
        let value = match value {
            Value::Array(items) => items
                .into_iter()
                .next()
                .ok_or_else(|| JointError::Validation("model returned an empty list".into()))?,
            other => other,
        };

        let (has_current, has_legacy, keys) = match &value {
            Value::Object(map) => (
                map.contains_key("entities"),
                map.contains_key("entity"),
                map.keys().cloned().collect::<Vec<_>>(),
            ),
            other => {
                return Err(JointError::Parse(format!(
                    "expected a JSON object, got {}",
                    json_kind(other)
                )))
            }
        };

        if has_current {
            serde_json::from_value(value)
                .map(Self::Current)
                .map_err(|e| JointError::Validation(format!("'entities' must be a list: {e}")))
        } else if has_legacy {
            serde_json::from_value(value)
                .map(Self::Legacy)
                .map_err(|e| JointError::Validation(format!("malformed legacy entity: {e}")))
        } else {
            Err(JointError::Validation(format!(
                "missing 'entities' key, got {keys:?}"
            )))
        }
    }

    fn normalize(self) -> Result<EntityInfo, JointError> {
        match self {
            Self::Current(shape) => {
                if shape.entities.is_empty() {
                    return Err(JointError::Validation("'entities' is empty".into()));
                }

                let entities = shape
                    .entities
                    .into_iter()
                    .enumerate()
                    .map(|(i, raw)| {
                        let raw: RawEntity = serde_json::from_value(raw).map_err(|e| {
                            JointError::Validation(format!("entity {i} is not an object: {e}"))
                        })?;
                        let name = raw.name.ok_or_else(|| {
                            JointError::Validation(format!("entity {i} missing 'name'"))
                        })?;
                        Ok(Entity {
                            name,
                            entity_type: entity_type_of(raw.entity_type.as_deref()),
                            aliases: raw.aliases,
                        })
                    })
                    .collect::<Result<Vec<_>, JointError>>()?;

                Ok(EntityInfo {
                    is_comparison: shape.is_comparison,
                    entities,
                    action: shape.action.unwrap_or_else(|| DEFAULT_ACTION.to_string()),
                    answer_type: shape.answer_type.as_deref().and_then(AnswerType::parse),
                    comparison_dimension: shape
                        .comparison_dimension
                        .as_deref()
                        .and_then(ComparisonDimension::parse),
                })
            }
            Self::Legacy(shape) => {
                tracing::debug!(joint = "entity_extractor", "Converting legacy single-entity shape");
                let name = shape
                    .entity
                    .ok_or_else(|| JointError::Validation("legacy 'entity' is blank".into()))?;
                Ok(EntityInfo {
                    is_comparison: false,
                    entities: vec![Entity {
                        name,
                        entity_type: entity_type_of(shape.entity_type.as_deref()),
                        aliases: shape.aliases,
                    }],
                    action: shape.action.unwrap_or_else(|| DEFAULT_ACTION.to_string()),
                    answer_type: None,
                    comparison_dimension: None,
                })
            }
        }
    }
}

impl EntityInfo {
    /// Normalize any entity-shaped JSON value (current, legacy, or list-wrapped).
    pub fn from_value(value: Value) -> Result<Self, JointError> {
        EntityResponse::from_value(value)?.normalize()
    }
}

fn entity_type_of(raw: Option<&str>) -> EntityType {
    raw.map(EntityType::parse).unwrap_or_default()
}

// Small models drift on scalar types; these accept what is usable and drop the rest.

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let items = match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items,
        Some(single @ Value::String(_)) => vec![single],
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect())
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Parse and validate a raw entity-extraction response.
pub fn parse_entity_response(raw: &str) -> Result<EntityInfo, JointError> {
    let value = extract_json(raw)
        .ok_or_else(|| JointError::Parse("no JSON value in response".into()))?;
    EntityInfo::from_value(value)
}

/// Parse an expansion response: a JSON list of new search phrasings.
pub fn parse_expansion_response(
    raw: &str,
    failed_terms: &[String],
) -> Result<Vec<String>, JointError> {
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

    let mut suggestions: Vec<String> = Vec::new();
    for item in items {
        let Value::String(s) = item else { continue };
        let term = s.trim();
        if term.is_empty()
            || failed_terms.iter().any(|f| f.trim().eq_ignore_ascii_case(term))
            || suggestions.iter().any(|existing| existing.eq_ignore_ascii_case(term))
        {
            continue;
        }
        suggestions.push(term.to_string());
        if suggestions.len() == MAX_EXPANSIONS {
            break;
        }
    }
    Ok(suggestions)
}

// ═══════════════════════════════════════════════════════════
// Joint
// ═══════════════════════════════════════════════════════════

pub struct EntityExtractorJoint<'a> {
    service: &'a InferenceService,
    config: JointConfig,
    expansion_temperature: f32,
}

impl<'a> EntityExtractorJoint<'a> {
    pub fn new(service: &'a InferenceService, config: JointConfig) -> Self {
        tracing::debug!(model = %config.model, "Entity extractor initialized");
        Self {
            service,
            config,
            expansion_temperature: DEFAULT_EXPANSION_TEMPERATURE,
        }
    }

    pub fn with_expansion_temperature(mut self, temperature: f32) -> Self {
        self.expansion_temperature = temperature;
        self
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// Extract the entities a query is about. Never fails: on any inference,
    /// parse, or validation error the whole query becomes a single entity.
    pub fn extract(&self, query: &str) -> EntityInfo {
        let started = Instant::now();
        match self.try_extract(query) {
            Ok(info) => {
                tracing::info!(
                    joint = "entity_extractor",
                    entities = ?info.entity_names(),
                    is_comparison = info.is_comparison,
                    answer_type = ?info.answer_type,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Entities extracted"
                );
                info
            }
            Err(e) => {
                tracing::warn!(
                    joint = "entity_extractor",
                    error = %e,
                    "Entity extraction failed, using query as single entity"
                );
                EntityInfo::fallback(query)
            }
        }
    }

    fn try_extract(&self, query: &str) -> Result<EntityInfo, JointError> {
        let prompt = build_entity_prompt(query);
        let response = self.service.complete(
            JointKind::EntityExtraction,
            &self.config.model,
            &prompt,
            self.config.temperature,
            self.config.timeout_secs,
            true,
        )?;
        tracing::debug!(
            joint = "entity_extractor",
            response = preview(&response, 300),
            "Raw entity response"
        );
        parse_entity_response(&response)
    }

    /// Up to three alternative search phrasings for terms that found nothing.
    /// Any failure yields an empty list.
    pub fn suggest_expansion(&self, query: &str, failed_terms: &[String]) -> Vec<String> {
        let prompt = build_expansion_prompt(query, failed_terms);
        let result = self
            .service
            .complete(
                JointKind::QueryExpansion,
                &self.config.model,
                &prompt,
                self.expansion_temperature,
                self.config.timeout_secs,
                true,
            )
            .map_err(JointError::from)
            .and_then(|response| parse_expansion_response(&response, failed_terms));

        match result {
            Ok(suggestions) => {
                tracing::debug!(
                    joint = "entity_extractor",
                    ?suggestions,
                    "Expansion suggestions generated"
                );
                suggestions
            }
            Err(e) => {
                tracing::warn!(joint = "entity_extractor", error = %e, "Query expansion failed");
                Vec::new()
            }
        }
    }
}
