// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::types::GepaConfig;
use crate::infra::errors::GepaError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: GepaConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub reflection: ReflectionConfig,
}

/// Settings for the built-in keyword evaluator used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Replaces the default keyword list when non-empty.
    pub keywords: Vec<String>,
    pub keyword_bonus: usize,
    /// Total length (plus bonuses) that maps to a score of 1.0.
    pub normalizer: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            keyword_bonus: 50,
            normalizer: 10_000.0,
        }
    }
}

/// Model-backed reflection. Off unless enabled and the key env var is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    pub enabled: bool,
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.7,
        }
    }
}

impl ReflectionConfig {
    /// The API key, if reflection is enabled and the variable is set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        match paths::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| GepaError::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GepaError> {
        self.optimizer.validate()?;
        if !self.evaluation.normalizer.is_finite() || self.evaluation.normalizer <= 0.0 {
            return Err(GepaError::Config(
                "evaluation.normalizer must be a positive number".into(),
            ));
        }
        if self.reflection.enabled && self.reflection.model.trim().is_empty() {
            return Err(GepaError::Config(
                "reflection.model must be set when reflection is enabled".into(),
            ));
        }
        Ok(())
    }
}
