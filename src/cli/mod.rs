// src/cli/mod.rs — CLI definition (clap derive)

pub mod inspect;
pub mod optimize;
pub mod progress;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::prompt::{PromptDict, PromptModule};

#[derive(Parser)]
#[command(name = "promptevo", about = "Evolve prompt text with a genetic optimizer", version)]
pub struct Cli {
    /// Config file path (defaults to ~/.promptevo/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level for promptevo targets (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Optimize a prompt set and write the improved prompts
    Optimize(OptimizeArgs),
    /// Print the module tree built from a prompt set
    Inspect {
        /// JSON object mapping dotted prompt names to text
        #[arg(long)]
        prompts: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    /// JSON object mapping dotted prompt names to text
    #[arg(long)]
    pub prompts: PathBuf,

    /// JSON array of task examples handed to the evaluator
    #[arg(long)]
    pub examples: Option<PathBuf>,

    /// Write the optimized prompts here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override optimizer.generations
    #[arg(long)]
    pub generations: Option<usize>,

    /// Override optimizer.population_size
    #[arg(long)]
    pub population: Option<usize>,

    /// Override optimizer.seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Prompt names (dotted) to keep fixed
    #[arg(long = "freeze")]
    pub freeze: Vec<String>,

    /// Print the run report as JSON to stderr
    #[arg(long)]
    pub report: bool,

    /// Suppress per-generation progress output
    #[arg(long)]
    pub quiet: bool,
}

/// Root module kind used for trees built from prompt files.
pub const ROOT_KIND: &str = "Program";

pub fn read_prompt_dict(path: &Path) -> anyhow::Result<PromptDict> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    let dict: PromptDict = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("{} is not a JSON object of strings: {e}", path.display()))?;
    if dict.is_empty() {
        anyhow::bail!("{} contains no prompts", path.display());
    }
    Ok(dict)
}

pub fn load_tree(path: &Path) -> anyhow::Result<PromptModule> {
    let dict = read_prompt_dict(path)?;
    Ok(PromptModule::from_prompt_dict(ROOT_KIND, &dict)?)
}
