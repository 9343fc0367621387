// src/main.rs — promptevo entry point

use clap::Parser;

use promptevo::cli::{inspect, optimize, Cli, Commands};
use promptevo::infra::config::Config;
use promptevo::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let config = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Optimize(args) => optimize::run_optimize(args, config).await,
        Commands::Inspect { prompts } => inspect::run_inspect(&prompts),
        Commands::Config => inspect::run_show_config(&config),
    }
}
