//! Process-level configuration for the joint pipeline.
//!
//! Precedence, lowest first: built-in defaults, optional JSON file,
//! `HERMIT_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::inference::{InferenceSettings, DEFAULT_OLLAMA_URL};

/// Application-level constants
pub const APP_NAME: &str = "Hermit";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-call inference budget for every joint unless overridden.
pub const DEFAULT_JOINT_TIMEOUT_SECS: u64 = 30;

/// Temperature for search-term expansion (more varied than scoring).
pub const DEFAULT_EXPANSION_TEMPERATURE: f32 = 0.3;

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "hermit_lib=info,warn"
}

/// Get the application data directory (~/Hermit/)
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

/// Default location of the optional JSON config file.
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("config.json"))
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Model identifier must not be empty")]
    EmptyModel,

    #[error("Temperature {0} is outside 0.0..=2.0")]
    InvalidTemperature(f32),

    #[error("Timeout must be at least one second")]
    ZeroTimeout,

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(String),
}

// ═══════════════════════════════════════════════════════════
// JointConfig
// ═══════════════════════════════════════════════════════════

/// Immutable configuration a joint receives at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    pub model: String,
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_JOINT_TIMEOUT_SECS
}

impl JointConfig {
    pub fn new(model: &str, temperature: f32) -> Result<Self, ConfigError> {
        let config = Self {
            model: model.to_string(),
            temperature,
            timeout_secs: DEFAULT_JOINT_TIMEOUT_SECS,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self, ConfigError> {
        self.timeout_secs = timeout_secs;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    fn preset(model: &str, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            temperature,
            timeout_secs: DEFAULT_JOINT_TIMEOUT_SECS,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Pipeline budgets
// ═══════════════════════════════════════════════════════════

/// Orchestrator-owned limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineBudget {
    /// Coverage verification rounds, including the first one.
    pub coverage_attempts: u32,
    pub article_top_k: usize,
    pub chunk_top_k: usize,
    /// Worker threads for order-independent batches (fact refinement).
    pub workers: usize,
}

impl Default for PipelineBudget {
    fn default() -> Self {
        Self {
            coverage_attempts: 3,
            article_top_k: 5,
            chunk_top_k: 5,
            workers: 4,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// HermitConfig
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HermitConfig {
    pub ollama_url: String,
    pub entity: JointConfig,
    pub scorer: JointConfig,
    pub filter: JointConfig,
    pub refinement: JointConfig,
    pub comparison: JointConfig,
    pub multi_hop: JointConfig,
    pub expansion_temperature: f32,
    pub inference: InferenceSettings,
    pub budget: PipelineBudget,
}

impl Default for HermitConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            entity: JointConfig::preset("llama3.2:1b", 0.1),
            scorer: JointConfig::preset("qwen2.5:0.5b", 0.0),
            filter: JointConfig::preset("llama3.2:1b", 0.1),
            refinement: JointConfig::preset("llama3.2:1b", 0.1),
            comparison: JointConfig::preset("llama3.2:1b", 0.1),
            multi_hop: JointConfig::preset("llama3.2:1b", 0.1),
            expansion_temperature: DEFAULT_EXPANSION_TEMPERATURE,
            inference: InferenceSettings::default(),
            budget: PipelineBudget::default(),
        }
    }
}

impl HermitConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the default config file if present, then environment overrides.
    pub fn resolve() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "Loading config file");
                Self::load(&path)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `HERMIT_*` overrides from any key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HERMIT_OLLAMA_URL") {
            self.ollama_url = url;
        }
        if let Some(model) = lookup("HERMIT_ENTITY_MODEL") {
            self.entity.model = model;
        }
        if let Some(model) = lookup("HERMIT_SCORER_MODEL") {
            self.scorer.model = model;
        }
        if let Some(model) = lookup("HERMIT_FILTER_MODEL") {
            self.filter.model = model;
        }
        if let Some(model) = lookup("HERMIT_REFINEMENT_MODEL") {
            self.refinement.model = model;
        }
        if let Some(raw) = lookup("HERMIT_JOINT_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: "HERMIT_JOINT_TIMEOUT_SECS".into(),
                value: raw.clone(),
            })?;
            for joint in self.joints_mut() {
                joint.timeout_secs = secs;
            }
        }
        self.validate()
    }

    /// Distinct model identifiers across all joints, in joint order.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for joint in [
            &self.entity,
            &self.scorer,
            &self.filter,
            &self.refinement,
            &self.comparison,
            &self.multi_hop,
        ] {
            if !ids.contains(&joint.model.as_str()) {
                ids.push(joint.model.as_str());
            }
        }
        ids
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for joint in [
            &self.entity,
            &self.scorer,
            &self.filter,
            &self.refinement,
            &self.comparison,
            &self.multi_hop,
        ] {
            joint.validate()?;
        }
        if !(0.0..=2.0).contains(&self.expansion_temperature) {
            return Err(ConfigError::InvalidTemperature(self.expansion_temperature));
        }
        Ok(())
    }

    fn joints_mut(&mut self) -> [&mut JointConfig; 6] {
        [
            &mut self.entity,
            &mut self.scorer,
            &mut self.filter,
            &mut self.refinement,
            &mut self.comparison,
            &mut self.multi_hop,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn app_data_dir_under_home() {
        if let (Some(dir), Some(home)) = (app_data_dir(), dirs::home_dir()) {
            assert!(dir.starts_with(home));
            assert!(dir.ends_with("Hermit"));
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = HermitConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scorer.model, "qwen2.5:0.5b");
        assert_eq!(config.budget.coverage_attempts, 3);
        assert!((config.expansion_temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn joint_config_rejects_empty_model() {
        assert!(matches!(JointConfig::new("  ", 0.1), Err(ConfigError::EmptyModel)));
    }

    #[test]
    fn joint_config_rejects_out_of_range_temperature() {
        assert!(matches!(
            JointConfig::new("m", 3.5),
            Err(ConfigError::InvalidTemperature(_))
        ));
        assert!(matches!(
            JointConfig::new("m", -0.1),
            Err(ConfigError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn joint_config_rejects_zero_timeout() {
        let config = JointConfig::new("m", 0.0).unwrap();
        assert!(matches!(config.with_timeout(0), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"scorer": {{"model": "phi3:mini", "temperature": 0.2}}, "budget": {{"chunk_top_k": 8}}}}"#
        )
        .unwrap();

        let config = HermitConfig::load(file.path()).unwrap();
        assert_eq!(config.scorer.model, "phi3:mini");
        assert_eq!(config.scorer.timeout_secs, DEFAULT_JOINT_TIMEOUT_SECS);
        assert_eq!(config.budget.chunk_top_k, 8);
        assert_eq!(config.budget.article_top_k, 5);
        assert_eq!(config.entity.model, "llama3.2:1b");
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            HermitConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_rejects_invalid_joint() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"filter": {{"model": "", "temperature": 0.1}}}}"#).unwrap();
        assert!(matches!(
            HermitConfig::load(file.path()),
            Err(ConfigError::EmptyModel)
        ));
    }

    #[test]
    fn overrides_apply_to_models_and_timeouts() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HERMIT_OLLAMA_URL", "http://gpu-box:11434"),
            ("HERMIT_ENTITY_MODEL", "mistral:7b"),
            ("HERMIT_JOINT_TIMEOUT_SECS", "12"),
        ]);
        let mut config = HermitConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.entity.model, "mistral:7b");
        assert_eq!(config.scorer.timeout_secs, 12);
        assert_eq!(config.multi_hop.timeout_secs, 12);
    }

    #[test]
    fn malformed_timeout_override_is_rejected() {
        let mut config = HermitConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "HERMIT_JOINT_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidOverride { .. })));
    }

    #[test]
    fn model_ids_are_distinct_in_joint_order() {
        let mut config = HermitConfig::default();
        assert_eq!(config.model_ids(), vec!["llama3.2:1b", "qwen2.5:0.5b"]);
        config.multi_hop.model = "phi3:mini".into();
        assert_eq!(config.model_ids(), vec!["llama3.2:1b", "qwen2.5:0.5b", "phi3:mini"]);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = HermitConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: HermitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
