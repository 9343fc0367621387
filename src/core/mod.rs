// src/core/mod.rs — Evolutionary optimization engine

pub mod operators;
pub mod optimizer;
pub mod population;
pub mod reflection;
pub mod types;

pub use optimizer::GepaOptimizer;
pub use reflection::{ModelReflector, ReflectionAdapter};
pub use types::{ExecutionTrace, GenerationStats, GepaConfig, OptimizationReport, OptimizerState};
