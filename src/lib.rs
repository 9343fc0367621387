// src/lib.rs — Library root for promptevo

pub mod cli;
pub mod core;
pub mod evaluator;
pub mod infra;
pub mod prompt;
pub mod provider;
