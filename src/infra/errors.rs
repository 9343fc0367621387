// src/infra/errors.rs — Error types for promptevo

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GepaError {
    // Configuration errors (fatal, raised before the loop starts)
    #[error("Invalid optimizer config: {field} {reason}")]
    ConfigValidation { field: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // Module tree errors
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Module '{parent}' already has a child named '{name}'")]
    DuplicateModule { parent: String, name: String },

    // Per-individual / per-call failures (absorbed by the optimizer)
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Reflection failed: {0}")]
    Reflection(String),

    #[error("Reflection timed out after {timeout_ms}ms")]
    ReflectionTimeout { timeout_ms: u64 },

    // Provider errors
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    // Infra
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GepaError {
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        GepaError::ConfigValidation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the optimizer must abort the run on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GepaError::ConfigValidation { .. } | GepaError::Config(_)
        )
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GepaError::Provider {
                retriable: true,
                ..
            } | GepaError::ReflectionTimeout { .. }
        )
    }
}
