// src/core/types.rs — Optimizer domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infra::errors::GepaError;

/// Configuration for a GEPA run. Every field has a default, so a partial
/// `[optimizer]` TOML section is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GepaConfig {
    pub population_size: usize,
    /// Number of evaluated generations. Zero evaluates only the initial population.
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    pub elitism_count: usize,
    /// Upper bound on mutated prompt length, in characters.
    pub max_prompt_length: usize,
    pub convergence_threshold: f64,
    /// Per-parameter rewrite probability used only when seeding the initial population.
    pub exploration_strength: f64,
    pub reflection_probability: f64,
    /// Traces collected per offspring before reflecting on it.
    pub reflection_traces: usize,
    pub reflection_timeout_secs: u64,
    pub evaluation_timeout_secs: Option<u64>,
    /// Bound on concurrent evaluation / reflection tasks within a generation.
    pub max_concurrency: usize,
    pub seed: Option<u64>,
}

impl Default for GepaConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            generations: 5,
            mutation_rate: 0.3,
            crossover_rate: 0.7,
            tournament_size: 3,
            elitism_count: 2,
            max_prompt_length: 4000,
            convergence_threshold: 0.01,
            exploration_strength: 0.5,
            reflection_probability: 0.3,
            reflection_traces: 3,
            reflection_timeout_secs: 30,
            evaluation_timeout_secs: None,
            max_concurrency: 4,
            seed: None,
        }
    }
}

impl GepaConfig {
    /// Reject configurations the generational loop cannot honor.
    pub fn validate(&self) -> Result<(), GepaError> {
        if self.population_size == 0 {
            return Err(GepaError::invalid_config(
                "population_size",
                "must be at least 1",
            ));
        }
        if self.tournament_size == 0 {
            return Err(GepaError::invalid_config(
                "tournament_size",
                "must be at least 1",
            ));
        }
        if self.elitism_count > self.population_size {
            return Err(GepaError::invalid_config(
                "elitism_count",
                format!(
                    "must not exceed population_size ({} > {})",
                    self.elitism_count, self.population_size
                ),
            ));
        }
        check_unit("mutation_rate", self.mutation_rate)?;
        check_unit("crossover_rate", self.crossover_rate)?;
        check_unit("exploration_strength", self.exploration_strength)?;
        check_unit("reflection_probability", self.reflection_probability)?;
        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return Err(GepaError::invalid_config(
                "convergence_threshold",
                format!("must be a finite value >= 0, got {}", self.convergence_threshold),
            ));
        }
        if self.max_prompt_length == 0 {
            return Err(GepaError::invalid_config(
                "max_prompt_length",
                "must be at least 1",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(GepaError::invalid_config(
                "max_concurrency",
                "must be at least 1",
            ));
        }
        if self.reflection_traces == 0 {
            return Err(GepaError::invalid_config(
                "reflection_traces",
                "must be at least 1",
            ));
        }
        if self.reflection_timeout_secs == 0 {
            return Err(GepaError::invalid_config(
                "reflection_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.evaluation_timeout_secs == Some(0) {
            return Err(GepaError::invalid_config(
                "evaluation_timeout_secs",
                "must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    pub fn reflection_timeout(&self) -> Duration {
        Duration::from_secs(self.reflection_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_secs.map(Duration::from_secs)
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), GepaError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GepaError::invalid_config(
            field,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

/// Lifecycle of a single `optimize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OptimizerState {
    NotStarted,
    Running { generation: usize },
    /// Stopped early at `generation` because the best fitness stopped moving.
    Converged { generation: usize },
    /// Ran every configured generation.
    Exhausted,
    /// Root module had learning disabled; returned untouched.
    Skipped,
}

impl std::fmt::Display for OptimizerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerState::NotStarted => write!(f, "not started"),
            OptimizerState::Running { generation } => write!(f, "running (generation {generation})"),
            OptimizerState::Converged { generation } => {
                write!(f, "converged at generation {generation}")
            }
            OptimizerState::Exhausted => write!(f, "exhausted"),
            OptimizerState::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-generation statistics, appended by the coordinator only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    /// Highest fitness within this generation.
    pub generation_best: f64,
    /// Best fitness seen in this or any earlier generation. Never decreases.
    pub best_so_far: f64,
    /// Mean over individuals whose evaluation succeeded; −∞ if none did.
    pub mean_fitness: f64,
    pub failed: usize,
    pub population_size: usize,
}

/// Summary of the last `optimize` call, for external observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub state: OptimizerState,
    pub generations_completed: usize,
    pub best_fitness: f64,
    pub evaluations: u64,
    pub reflections: u64,
    pub reflection_failures: u64,
    pub config: GepaConfig,
    pub history: Vec<GenerationStats>,
}

/// A single step recorded while producing a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub name: String,
    pub output: serde_json::Value,
}

/// Evidence handed to a reflection adapter. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub task_id: String,
    pub module_path: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub prompt_used: String,
    pub execution_time: Duration,
    pub timestamp: DateTime<Utc>,
    pub steps: Vec<TraceStep>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionTrace {
    pub fn new(module_path: impl Into<String>, prompt_used: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            module_path: module_path.into(),
            input: serde_json::Value::Null,
            output: serde_json::Value::Null,
            prompt_used: prompt_used.into(),
            execution_time: Duration::ZERO,
            timestamp: Utc::now(),
            steps: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }
}
