// src/prompt/mod.rs — Prompt parameters and the module tree that owns them

pub mod consumer;
pub mod module;
pub mod parameter;

pub use consumer::{PromptConsumer, Signature};
pub use module::{LearningMode, ModuleInfo, PromptDict, PromptModule};
pub use parameter::{OptimizationMethod, OptimizationRecord, Parameter, ParameterState};
