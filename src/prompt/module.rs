// src/prompt/module.rs — Prompt module tree
//
// A module owns its parameters, its prompt consumers and its child modules
// by value. A child therefore has exactly one parent and the tree cannot
// contain cycles.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::consumer::PromptConsumer;
use super::parameter::{Metadata, OptimizationMethod, Parameter, ParameterState};
use crate::core::types::GepaConfig;
use crate::infra::errors::GepaError;

/// Flat `dotted.name → prompt text` mapping used for export and import.
pub type PromptDict = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningMode {
    Disabled,
    Online,
    Offline,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub execution_count: u64,
    pub total_execution_secs: f64,
    pub average_execution_secs: f64,
}

/// Introspection export consumed by audit and monitoring tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub kind: String,
    pub path: String,
    pub learning_enabled: bool,
    pub learning_mode: LearningMode,
    pub frozen: bool,
    pub prompt_count: usize,
    pub prompts: BTreeMap<String, String>,
    pub parameter_states: BTreeMap<String, ParameterState>,
    pub submodules: Vec<String>,
    pub performance_metrics: BTreeMap<String, f64>,
    pub execution_stats: ExecutionStats,
    pub optimization_config: Option<GepaConfig>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct PromptModule {
    kind: String,
    path: String,
    parameters: BTreeMap<String, Parameter>,
    children: BTreeMap<String, PromptModule>,
    consumers: BTreeMap<String, Box<dyn PromptConsumer>>,
    learning_enabled: bool,
    learning_mode: LearningMode,
    frozen: bool,
    execution_count: u64,
    total_execution_time: Duration,
    performance: BTreeMap<String, f64>,
    metadata: Metadata,
    optimization_config: Option<GepaConfig>,
}

/// Parameter and module names: non-empty, ASCII alphanumerics, `_` or `-`.
/// Dots are reserved as the path separator.
pub fn validate_name(name: &str) -> Result<(), GepaError> {
    if name.trim().is_empty() {
        return Err(GepaError::InvalidName {
            name: name.to_string(),
            reason: "name must not be empty",
        });
    }
    if name.contains('.') {
        return Err(GepaError::InvalidName {
            name: name.to_string(),
            reason: "'.' is reserved as the path separator",
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GepaError::InvalidName {
            name: name.to_string(),
            reason: "only ASCII letters, digits, '_' and '-' are allowed",
        });
    }
    Ok(())
}

impl PromptModule {
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            path: kind.clone(),
            kind,
            parameters: BTreeMap::new(),
            children: BTreeMap::new(),
            consumers: BTreeMap::new(),
            learning_enabled: true,
            learning_mode: LearningMode::default(),
            frozen: false,
            execution_count: 0,
            total_execution_time: Duration::ZERO,
            performance: BTreeMap::new(),
            metadata: Metadata::new(),
            optimization_config: None,
        }
    }

    /// Build a tree from a flat prompt dict, creating a child module for
    /// every dotted prefix.
    pub fn from_prompt_dict(kind: impl Into<String>, prompts: &PromptDict) -> Result<Self, GepaError> {
        let mut root = Self::new(kind);
        for (dotted, text) in prompts {
            let mut segments: Vec<&str> = dotted.split('.').collect();
            let leaf = segments.pop().unwrap_or_default();
            let mut node = &mut root;
            for segment in segments {
                if node.child(segment).is_none() {
                    node.add_module(segment, PromptModule::new(segment))?;
                }
                node = node
                    .child_mut(segment)
                    .ok_or_else(|| GepaError::Config(format!("missing child '{segment}'")))?;
            }
            node.register(leaf, text.clone(), None)?;
        }
        Ok(root)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Dotted path from the root of the tree this module lives in.
    pub fn path(&self) -> &str {
        &self.path
    }

    // ─── Parameter registry ─────────────────────────────────────

    /// Register a parameter, or update it in place if `name` already exists.
    pub fn register(
        &mut self,
        name: &str,
        text: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<&Parameter, GepaError> {
        validate_name(name)?;
        let text = text.into();
        self.apply(name, &text);

        let path = format!("{}.{}", self.path, name);
        let param = self
            .parameters
            .entry(name.to_string())
            .and_modify(|p| {
                p.value = text.clone();
                p.touch();
            })
            .or_insert_with(|| Parameter::new(name, path, text.clone()));
        if let Some(metadata) = metadata {
            param.metadata.extend(metadata);
        }
        tracing::trace!(path = %param.path, "registered prompt parameter");
        Ok(param)
    }

    /// Register a parameter wired to `consumer`; the text is applied immediately.
    pub fn register_with_consumer(
        &mut self,
        name: &str,
        text: impl Into<String>,
        consumer: impl PromptConsumer + 'static,
    ) -> Result<&Parameter, GepaError> {
        validate_name(name)?;
        self.consumers.insert(name.to_string(), Box::new(consumer));
        self.register(name, text, None)
    }

    /// Overwrite a parameter's value. Returns false if `name` is unknown.
    pub fn update(&mut self, name: &str, text: impl Into<String>, record_history: bool) -> bool {
        let record = record_history.then_some((OptimizationMethod::ManualUpdate, 0.0));
        self.write(name, text.into(), record)
    }

    /// Overwrite a parameter's value and record the change under `method`.
    pub fn update_with(
        &mut self,
        name: &str,
        text: impl Into<String>,
        method: OptimizationMethod,
        fitness_delta: f64,
    ) -> bool {
        self.write(name, text.into(), Some((method, fitness_delta)))
    }

    /// Like `update`, but `dotted` may address a parameter of any descendant.
    pub fn update_path(&mut self, dotted: &str, text: impl Into<String>, record_history: bool) -> bool {
        match self.owner_mut(dotted) {
            Some((module, name)) => module.update(name, text, record_history),
            None => false,
        }
    }

    pub(crate) fn update_path_with(
        &mut self,
        dotted: &str,
        text: impl Into<String>,
        method: OptimizationMethod,
        fitness_delta: f64,
    ) -> bool {
        match self.owner_mut(dotted) {
            Some((module, name)) => module.update_with(name, text, method, fitness_delta),
            None => false,
        }
    }

    fn write(&mut self, name: &str, text: String, record: Option<(OptimizationMethod, f64)>) -> bool {
        let Some(param) = self.parameters.get_mut(name) else {
            return false;
        };
        let old = std::mem::replace(&mut param.value, text);
        param.touch();
        if let Some((method, delta)) = record {
            let new = param.value.clone();
            param.record_optimization(old, new, delta, method, None);
        }
        let value = param.value.clone();
        self.apply(name, &value);
        true
    }

    fn apply(&mut self, name: &str, text: &str) {
        if let Some(consumer) = self.consumers.get_mut(name) {
            consumer.set_instructions(text);
        }
    }

    /// Resolve a dotted name to the module owning it and the local name.
    fn owner_mut<'s, 'd>(&'s mut self, dotted: &'d str) -> Option<(&'s mut PromptModule, &'d str)> {
        if self.parameters.contains_key(dotted) {
            return Some((self, dotted));
        }
        let (head, rest) = dotted.split_once('.')?;
        self.children.get_mut(head)?.owner_mut(rest)
    }

    fn owner<'s, 'd>(&'s self, dotted: &'d str) -> Option<(&'s PromptModule, &'d str)> {
        if self.parameters.contains_key(dotted) {
            return Some((self, dotted));
        }
        let (head, rest) = dotted.split_once('.')?;
        self.children.get(head)?.owner(rest)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Look up a parameter by dotted name anywhere below this module.
    pub fn get_path(&self, dotted: &str) -> Option<&Parameter> {
        self.owner(dotted).and_then(|(module, name)| module.get(name))
    }

    pub fn get_prompt(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|p| p.value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.consumers.remove(name);
        self.parameters.remove(name).is_some()
    }

    /// Returns false if `name` is unknown or archived.
    pub fn freeze(&mut self, name: &str) -> bool {
        self.parameters
            .get_mut(name)
            .map(Parameter::freeze)
            .unwrap_or(false)
    }

    /// Returns false if `name` is unknown or archived.
    pub fn unfreeze(&mut self, name: &str) -> bool {
        self.parameters
            .get_mut(name)
            .map(Parameter::unfreeze)
            .unwrap_or(false)
    }

    pub fn archive(&mut self, name: &str) -> bool {
        match self.parameters.get_mut(name) {
            Some(param) => {
                param.archive();
                true
            }
            None => false,
        }
    }

    pub fn is_frozen(&self, name: &str) -> bool {
        self.parameters
            .get(name)
            .map(Parameter::is_frozen)
            .unwrap_or(false)
    }

    pub fn consumer(&self, name: &str) -> Option<&dyn PromptConsumer> {
        self.consumers.get(name).map(|c| c.as_ref())
    }

    // ─── Enumeration ────────────────────────────────────────────

    /// Active parameters of this module and, with `recurse`, of every descendant.
    pub fn parameters(&self, recurse: bool) -> Box<dyn Iterator<Item = &Parameter> + '_> {
        Box::new(self.named_parameters(recurse).map(|(_, p)| p))
    }

    /// Active parameters keyed by dotted name relative to this module.
    /// Frozen, inactive and archived parameters are never yielded.
    pub fn named_parameters(
        &self,
        recurse: bool,
    ) -> Box<dyn Iterator<Item = (String, &Parameter)> + '_> {
        let direct = self
            .parameters
            .iter()
            .filter(|(_, p)| p.is_optimizable())
            .map(|(name, p)| (name.clone(), p));
        if !recurse {
            return Box::new(direct);
        }
        let nested = self.children.iter().flat_map(|(child_name, child)| {
            child
                .named_parameters(true)
                .map(move |(name, p)| (format!("{child_name}.{name}"), p))
        });
        Box::new(direct.chain(nested))
    }

    /// This module (with an empty name) followed by its children, or every
    /// descendant when `recurse` is set.
    pub fn named_modules(&self, recurse: bool) -> Box<dyn Iterator<Item = (String, &PromptModule)> + '_> {
        let this = std::iter::once((String::new(), self));
        let below = self.children.iter().flat_map(move |(child_name, child)| {
            let own = std::iter::once((child_name.clone(), child));
            let deeper: Box<dyn Iterator<Item = (String, &PromptModule)> + '_> = if recurse {
                Box::new(
                    child
                        .named_modules(true)
                        .skip(1)
                        .map(move |(name, m)| (format!("{child_name}.{name}"), m)),
                )
            } else {
                Box::new(std::iter::empty())
            };
            own.chain(deeper)
        });
        Box::new(this.chain(below))
    }

    // ─── Tree structure ─────────────────────────────────────────

    /// Take ownership of `child`. Its subtree's paths are rebased under this module.
    pub fn add_module(&mut self, name: &str, mut child: PromptModule) -> Result<&mut PromptModule, GepaError> {
        validate_name(name)?;
        if self.children.contains_key(name) {
            return Err(GepaError::DuplicateModule {
                parent: self.path.clone(),
                name: name.to_string(),
            });
        }
        child.rebase(format!("{}.{}", self.path, name));
        Ok(self.children.entry(name.to_string()).or_insert(child))
    }

    /// Detach a child; it becomes the root of its own tree.
    pub fn remove_module(&mut self, name: &str) -> Option<PromptModule> {
        let mut child = self.children.remove(name)?;
        let root_path = child.kind.clone();
        child.rebase(root_path);
        Some(child)
    }

    pub fn child(&self, name: &str) -> Option<&PromptModule> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut PromptModule> {
        self.children.get_mut(name)
    }

    fn rebase(&mut self, path: String) {
        for (name, param) in self.parameters.iter_mut() {
            param.path = format!("{path}.{name}");
        }
        for (name, child) in self.children.iter_mut() {
            child.rebase(format!("{path}.{name}"));
        }
        self.path = path;
    }

    // ─── Bulk export / import ───────────────────────────────────

    pub fn get_prompt_dict(&self, recurse: bool) -> PromptDict {
        self.named_parameters(recurse)
            .map(|(name, p)| (name, p.value.clone()))
            .collect()
    }

    /// Apply a prompt dict. Known names are updated without recording history,
    /// unknown direct names are registered, dotted names are routed to the
    /// named child. Returns the number of entries applied.
    pub fn load_prompt_dict(&mut self, prompts: &PromptDict, recurse: bool) -> usize {
        let mut applied = 0;
        let mut nested: BTreeMap<&str, PromptDict> = BTreeMap::new();

        for (name, text) in prompts {
            match name.split_once('.') {
                None => {
                    if self.update(name, text.clone(), false) {
                        applied += 1;
                    } else {
                        match self.register(name, text.clone(), None) {
                            Ok(_) => applied += 1,
                            Err(e) => tracing::warn!(module = %self.path, "skipping prompt: {e}"),
                        }
                    }
                }
                Some((head, rest)) if recurse => {
                    nested
                        .entry(head)
                        .or_default()
                        .insert(rest.to_string(), text.clone());
                }
                Some(_) => {}
            }
        }

        for (child_name, sub) in nested {
            match self.children.get_mut(child_name) {
                Some(child) => applied += child.load_prompt_dict(&sub, true),
                None => tracing::debug!(
                    module = %self.path,
                    child = child_name,
                    entries = sub.len(),
                    "no such submodule, skipping prompts"
                ),
            }
        }
        applied
    }

    // ─── Learning controls ──────────────────────────────────────

    pub fn enable_learning(&mut self, enabled: bool) {
        self.learning_enabled = enabled;
    }

    pub fn is_learning_enabled(&self) -> bool {
        self.learning_enabled
    }

    pub fn set_learning_mode(&mut self, mode: LearningMode) {
        self.learning_mode = mode;
    }

    pub fn learning_mode(&self) -> LearningMode {
        self.learning_mode
    }

    pub fn set_optimization_config(&mut self, config: GepaConfig) {
        self.optimization_config = Some(config);
    }

    pub fn optimization_config(&self) -> Option<&GepaConfig> {
        self.optimization_config.as_ref()
    }

    /// Freeze this module and its direct parameters. Descendants are untouched.
    pub fn freeze_all(&mut self) {
        self.frozen = true;
        for param in self.parameters.values_mut() {
            param.freeze();
        }
    }

    pub fn unfreeze_all(&mut self) {
        self.frozen = false;
        for param in self.parameters.values_mut() {
            param.unfreeze();
        }
    }

    pub fn is_module_frozen(&self) -> bool {
        self.frozen
    }

    // ─── Performance tracking ───────────────────────────────────

    pub fn record_execution(&mut self, elapsed: Duration, metrics: &[(&str, f64)]) {
        self.execution_count += 1;
        self.total_execution_time += elapsed;
        if !metrics.is_empty() {
            self.update_performance_metrics(metrics);
        }
    }

    /// Update module metrics and mirror them onto every direct parameter.
    pub fn update_performance_metrics(&mut self, metrics: &[(&str, f64)]) {
        for (key, value) in metrics {
            self.performance.insert(key.to_string(), *value);
        }
        for param in self.parameters.values_mut() {
            param.update_metrics(metrics.iter().copied());
        }
    }

    pub fn performance_metrics(&self) -> &BTreeMap<String, f64> {
        &self.performance
    }

    pub fn execution_stats(&self) -> ExecutionStats {
        let total = self.total_execution_time.as_secs_f64();
        ExecutionStats {
            execution_count: self.execution_count,
            total_execution_secs: total,
            average_execution_secs: total / self.execution_count.max(1) as f64,
        }
    }

    // ─── Metadata ───────────────────────────────────────────────

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn all_metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn module_info(&self) -> ModuleInfo {
        ModuleInfo {
            kind: self.kind.clone(),
            path: self.path.clone(),
            learning_enabled: self.learning_enabled,
            learning_mode: self.learning_mode,
            frozen: self.frozen,
            prompt_count: self.parameters.len(),
            prompts: self
                .parameters
                .iter()
                .map(|(name, p)| (name.clone(), p.value.clone()))
                .collect(),
            parameter_states: self
                .parameters
                .iter()
                .map(|(name, p)| (name.clone(), p.state))
                .collect(),
            submodules: self
                .named_modules(true)
                .skip(1)
                .map(|(name, _)| name)
                .collect(),
            performance_metrics: self.performance.clone(),
            execution_stats: self.execution_stats(),
            optimization_config: self.optimization_config.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl std::fmt::Display for PromptModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.kind)?;
        writeln!(
            f,
            "  Learning: {}",
            if self.learning_enabled { "enabled" } else { "disabled" }
        )?;
        writeln!(f, "  Mode: {:?}", self.learning_mode)?;
        writeln!(f, "  Frozen: {}", if self.frozen { "yes" } else { "no" })?;
        write!(f, "  Prompts: {}", self.parameters.len())?;
        for (name, param) in &self.parameters {
            write!(
                f,
                "\n    {name}: {} ({} optimizations)",
                param.state,
                param.rollup().total_records
            )?;
        }
        Ok(())
    }
}
