// src/prompt/parameter.rs — A named, versioned piece of prompt text

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Records kept per parameter before the oldest are evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterState {
    Active,
    Inactive,
    Frozen,
    /// Terminal. Nothing moves a parameter out of this state.
    Archived,
}

impl std::fmt::Display for ParameterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterState::Active => write!(f, "active"),
            ParameterState::Inactive => write!(f, "inactive"),
            ParameterState::Frozen => write!(f, "frozen"),
            ParameterState::Archived => write!(f, "archived"),
        }
    }
}

/// How a parameter's value came to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    ManualUpdate,
    Mutation,
    Crossover,
    Reflection,
    Gepa,
}

impl std::fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationMethod::ManualUpdate => write!(f, "manual_update"),
            OptimizationMethod::Mutation => write!(f, "mutation"),
            OptimizationMethod::Crossover => write!(f, "crossover"),
            OptimizationMethod::Reflection => write!(f, "reflection"),
            OptimizationMethod::Gepa => write!(f, "gepa"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub parameter_name: String,
    pub old_value: String,
    pub new_value: String,
    pub fitness_delta: f64,
    pub timestamp: DateTime<Utc>,
    pub method: OptimizationMethod,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Aggregates that survive ring-buffer eviction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRollup {
    pub total_records: u64,
    pub cumulative_delta: f64,
    pub best_delta: Option<f64>,
    pub last_method: Option<OptimizationMethod>,
}

impl HistoryRollup {
    fn absorb(&mut self, record: &OptimizationRecord) {
        self.total_records += 1;
        self.cumulative_delta += record.fitness_delta;
        self.best_delta = Some(match self.best_delta {
            Some(best) => best.max(record.fitness_delta),
            None => record.fitness_delta,
        });
        self.last_method = Some(record.method);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub path: String,
    pub value: String,
    pub state: ParameterState,
    history: VecDeque<OptimizationRecord>,
    history_capacity: usize,
    rollup: HistoryRollup,
    pub metrics: BTreeMap<String, f64>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, path: impl Into<String>, value: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            path: path.into(),
            value: value.into(),
            state: ParameterState::Active,
            history: VecDeque::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            rollup: HistoryRollup::default(),
            metrics: BTreeMap::new(),
            metadata: Metadata::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Cap retained history at `capacity` records (minimum 1). Older records
    /// are dropped immediately if the buffer is already larger.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
        self
    }

    /// Only active parameters are visible to the optimizer.
    pub fn is_optimizable(&self) -> bool {
        self.state == ParameterState::Active
    }

    pub fn is_frozen(&self) -> bool {
        self.state == ParameterState::Frozen
    }

    pub fn is_archived(&self) -> bool {
        self.state == ParameterState::Archived
    }

    pub fn record_optimization(
        &mut self,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        fitness_delta: f64,
        method: OptimizationMethod,
        metadata: Option<Metadata>,
    ) {
        let record = OptimizationRecord {
            parameter_name: self.name.clone(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            fitness_delta,
            timestamp: Utc::now(),
            method,
            metadata: metadata.unwrap_or_default(),
        };
        self.rollup.absorb(&record);
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.touch();
    }

    pub fn history(&self) -> impl Iterator<Item = &OptimizationRecord> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn rollup(&self) -> &HistoryRollup {
        &self.rollup
    }

    pub fn update_metrics<'a>(&mut self, metrics: impl IntoIterator<Item = (&'a str, f64)>) {
        for (key, value) in metrics {
            self.metrics.insert(key.to_string(), value);
        }
        self.touch();
    }

    /// Returns false for archived parameters, which never change state.
    pub fn freeze(&mut self) -> bool {
        self.transition(ParameterState::Frozen)
    }

    pub fn unfreeze(&mut self) -> bool {
        self.transition(ParameterState::Active)
    }

    pub fn deactivate(&mut self) -> bool {
        self.transition(ParameterState::Inactive)
    }

    pub fn archive(&mut self) {
        self.state = ParameterState::Archived;
        self.touch();
    }

    fn transition(&mut self, to: ParameterState) -> bool {
        if self.is_archived() {
            return false;
        }
        self.state = to;
        self.touch();
        true
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
