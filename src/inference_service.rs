//! Inference service: the single handle every joint uses to reach the model backend.
//!
//! Constructed once by the orchestrator and lent to each joint constructor.
//! Lifecycle: `start()` → any number of concurrent `complete()` calls → `shutdown()`.
//! After shutdown every call fails with `InferenceError::ServiceStopped`, which
//! joints handle like any other backend failure.
//!
//! The service keeps no per-query state: only the client, the backend-wide
//! settings, and observability counters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::config::HermitConfig;
use crate::pipeline::inference::{
    CompletionRequest, InferenceError, InferenceSettings, LlmClient, OllamaClient,
};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Which joint issued an inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    EntityExtraction,
    QueryExpansion,
    ArticleScoring,
    ChunkFiltering,
    FactRefinement,
    Comparison,
    MultiHop,
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EntityExtraction => write!(f, "Entity extraction"),
            Self::QueryExpansion => write!(f, "Query expansion"),
            Self::ArticleScoring => write!(f, "Article scoring"),
            Self::ChunkFiltering => write!(f, "Chunk filtering"),
            Self::FactRefinement => write!(f, "Fact refinement"),
            Self::Comparison => write!(f, "Comparison"),
            Self::MultiHop => write!(f, "Multi-hop resolution"),
        }
    }
}

/// Snapshot of the most recently started inference call.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub kind: JointKind,
    pub model: String,
    /// When the call started (ISO 8601).
    pub started_at: String,
}

// ═══════════════════════════════════════════════════════════
// InferenceService
// ═══════════════════════════════════════════════════════════

pub struct InferenceService {
    client: Box<dyn LlmClient>,
    settings: InferenceSettings,
    running: AtomicBool,
    in_flight: AtomicUsize,
    last_op: Mutex<Option<ActiveOperation>>,
}

impl InferenceService {
    /// Start a service around an already-built client.
    pub fn start(client: Box<dyn LlmClient>, settings: InferenceSettings) -> Self {
        tracing::info!(
            stop_sequences = settings.stop_sequences.len(),
            max_tokens = ?settings.max_tokens,
            "Inference service started"
        );
        Self {
            client,
            settings,
            running: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            last_op: Mutex::new(None),
        }
    }

    /// Start a service backed by an Ollama instance.
    pub fn ollama(base_url: &str, settings: InferenceSettings) -> Result<Self, InferenceError> {
        let client = OllamaClient::new(base_url)?;
        Ok(Self::start(Box::new(client), settings))
    }

    /// Start an Ollama-backed service and confirm every configured joint model is installed.
    pub fn from_config(config: &HermitConfig) -> Result<Self, InferenceError> {
        let client = OllamaClient::new(&config.ollama_url)?;
        Self::start_checked(Box::new(client), config)
    }

    /// Start a service around `client`, failing if any configured joint model is missing.
    pub fn start_checked(
        client: Box<dyn LlmClient>,
        config: &HermitConfig,
    ) -> Result<Self, InferenceError> {
        let service = Self::start(client, config.inference.clone());
        service.ensure_models(&config.model_ids())?;
        Ok(service)
    }

    /// Fails with `ModelNotFound` for the first model the backend does not have.
    pub fn ensure_models(&self, models: &[&str]) -> Result<(), InferenceError> {
        if !self.is_running() {
            return Err(InferenceError::ServiceStopped);
        }
        for model in models {
            if !self.client.is_model_available(model)? {
                tracing::warn!(
                    model,
                    installed = ?self.available_models().unwrap_or_default(),
                    "Configured model not installed"
                );
                return Err(InferenceError::ModelNotFound(model.to_string()));
            }
        }
        tracing::info!(models = models.len(), "Configured models available");
        Ok(())
    }

    /// Stop accepting calls. Calls already in flight finish normally.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(
                in_flight = self.in_flight(),
                "Inference service shut down"
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of calls currently waiting on the backend.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The most recently started call, if any.
    pub fn last_operation(&self) -> Option<ActiveOperation> {
        self.last_op.lock().ok()?.clone()
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Models the backend reports as installed.
    pub fn available_models(&self) -> Result<Vec<String>, InferenceError> {
        if !self.is_running() {
            return Err(InferenceError::ServiceStopped);
        }
        self.client.list_models()
    }

    /// Run one completion. Blocks until the backend answers or `timeout_secs` elapses.
    pub fn complete(
        &self,
        kind: JointKind,
        model: &str,
        prompt: &str,
        temperature: f32,
        timeout_secs: u64,
        prefer_structured: bool,
    ) -> Result<String, InferenceError> {
        if !self.is_running() {
            return Err(InferenceError::ServiceStopped);
        }

        let request = CompletionRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            temperature,
            timeout_secs,
            prefer_structured,
            stop: self.settings.stop_sequences.clone(),
            max_tokens: self.settings.max_tokens,
        };

        let _guard = InFlightGuard::enter(self, kind, model);
        let started = Instant::now();
        let result = self.client.complete(&request);

        match &result {
            Ok(text) => tracing::debug!(
                joint = %kind,
                model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                response_len = text.len(),
                "Inference completed"
            ),
            Err(e) => tracing::warn!(
                joint = %kind,
                model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Inference failed"
            ),
        }

        result
    }

    fn record_start(&self, kind: JointKind, model: &str) {
        if let Ok(mut last) = self.last_op.lock() {
            *last = Some(ActiveOperation {
                kind,
                model: model.to_string(),
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
    }
}

impl Drop for InferenceService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ═══════════════════════════════════════════════════════════
// InFlightGuard: RAII call counter
// ═══════════════════════════════════════════════════════════

struct InFlightGuard<'a> {
    service: &'a InferenceService,
}

impl<'a> InFlightGuard<'a> {
    fn enter(service: &'a InferenceService, kind: JointKind, model: &str) -> Self {
        service.in_flight.fetch_add(1, Ordering::SeqCst);
        service.record_start(kind, model);
        Self { service }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.service.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
