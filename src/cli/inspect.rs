// src/cli/inspect.rs — `promptevo inspect` and `promptevo config`

use std::path::Path;

use super::load_tree;
use crate::infra::config::Config;

/// Print the module tree built from a prompt file as JSON.
pub fn run_inspect(prompts: &Path) -> anyhow::Result<()> {
    let tree = load_tree(prompts)?;
    println!("{}", serde_json::to_string_pretty(&tree.module_info())?);
    eprintln!("{tree}");
    Ok(())
}

/// Print the effective configuration as TOML after validating it.
pub fn run_show_config(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    print!("{}", render_config(config)?);
    Ok(())
}

pub fn render_config(config: &Config) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
