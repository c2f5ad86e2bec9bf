//! Scripted LLM client for tests and offline runs.
//!
//! Responses are served in order; the last scripted reply repeats once the
//! script runs out. Every request is recorded so tests can assert on prompts
//! or on the absence of any inference call.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::{CompletionRequest, LlmClient};
use super::InferenceError;

/// Mock LLM client: returns configurable responses or failures.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    last: Mutex<Option<Result<String, InferenceError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    available_models: Vec<String>,
}

impl MockLlmClient {
    /// A client that always answers with `response`.
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    /// A client that always fails with `error`.
    pub fn failing(error: InferenceError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    /// A client that replays `script` in order, repeating the final entry.
    pub fn scripted(script: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            available_models: vec!["llama3.2:1b".to_string(), "qwen2.5:0.5b".to_string()],
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    /// Number of completion calls received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Snapshot of every request received, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Prompt of the most recent request, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().map(|req| req.prompt.clone()))
    }
}

impl LlmClient for MockLlmClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        self.requests
            .lock()
            .map_err(|_| InferenceError::LockPoisoned)?
            .push(request.clone());

        let mut script = self.script.lock().map_err(|_| InferenceError::LockPoisoned)?;
        let mut last = self.last.lock().map_err(|_| InferenceError::LockPoisoned)?;

        if let Some(next) = script.pop_front() {
            *last = Some(next.clone());
            return next;
        }

        last.clone().unwrap_or(Err(InferenceError::EmptyResponse))
    }

    fn is_model_available(&self, model: &str) -> Result<bool, InferenceError> {
        Ok(self.available_models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        Ok(self.available_models.clone())
    }
}
