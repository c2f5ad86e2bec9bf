use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::InferenceError;

/// One completion call against the inference backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Ask the backend for JSON-constrained output. Advisory only.
    pub prefer_structured: bool,
    pub stop: Vec<String>,
    pub max_tokens: Option<i32>,
}

/// Backend-wide generation settings applied to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Stop sequences bounding over-generation.
    pub stop_sequences: Vec<String>,
    /// Maximum tokens per completion. None = backend default.
    pub max_tokens: Option<i32>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            stop_sequences: Vec::new(),
            max_tokens: Some(512),
        }
    }
}

/// Inference backend abstraction (allows mocking)
pub trait LlmClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError>;

    fn is_model_available(&self, model: &str) -> Result<bool, InferenceError>;

    fn list_models(&self) -> Result<Vec<String>, InferenceError>;
}

impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        (**self).complete(request)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, InferenceError> {
        (**self).is_model_available(model)
    }

    fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        (**self).list_models()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_client_is_object_safe() {
        fn _accepts(_: &dyn LlmClient) {}
    }

    #[test]
    fn default_settings_cap_tokens() {
        let settings = InferenceSettings::default();
        assert!(settings.stop_sequences.is_empty());
        assert_eq!(settings.max_tokens, Some(512));
    }

    #[test]
    fn settings_deserialize_with_partial_fields() {
        let settings: InferenceSettings =
            serde_json::from_str(r#"{"stop_sequences": ["}]"]}"#).unwrap();
        assert_eq!(settings.stop_sequences, vec!["}]".to_string()]);
        assert_eq!(settings.max_tokens, Some(512));
    }
}
