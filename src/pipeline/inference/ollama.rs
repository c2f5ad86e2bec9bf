use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{CompletionRequest, LlmClient};
use super::InferenceError;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Connection establishment budget; request budgets come from each call.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at an Ollama instance.
    pub fn new(base_url: &str) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Default Ollama instance at localhost:11434.
    pub fn default_local() -> Result<Self, InferenceError> {
        Self::new(DEFAULT_OLLAMA_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error, timeout_secs: u64) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout { secs: timeout_secs }
        } else if e.is_connect() {
            InferenceError::Connection(self.base_url.clone())
        } else {
            InferenceError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions<'a>,
}

#[derive(Serialize)]
struct OllamaOptions<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

fn build_generate_body(request: &CompletionRequest) -> OllamaGenerateRequest<'_> {
    OllamaGenerateRequest {
        model: &request.model,
        prompt: &request.prompt,
        stream: false,
        format: request.prefer_structured.then_some("json"),
        options: OllamaOptions {
            temperature: request.temperature,
            stop: &request.stop,
            num_predict: request.max_tokens,
        },
    }
}

impl LlmClient for OllamaClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = build_generate_body(request);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(request.timeout_secs))
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e, request.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    secs: request.timeout_secs,
                }
            } else {
                InferenceError::ResponseParsing(e.to_string())
            }
        })?;

        if parsed.response.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }

        Ok(parsed.response)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, InferenceError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .send()
            .map_err(|e| self.map_send_error(e, CONNECT_TIMEOUT_SECS))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| InferenceError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}
