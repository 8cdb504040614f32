//! fleet - resource-management CLI scenario orchestrator
//!
//! Runs end-to-end scenarios against the resource CLI in dependency order,
//! in parallel where the entity graph allows, and tears down what they
//! created.

use clap::Parser;
use std::path::PathBuf;

use fleet::common::{config::Config, logging, paths};
use fleet::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "fleet", about = "Dependency-aware scenario runner for the resource CLI")]
#[command(version, long_about = None)]
struct Cli {
    /// Debug logging and a verbose collaborator
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let log_file = cli.log_file.clone().or_else(|| {
        if config.logging.file {
            paths::default_run_log()
        } else {
            None
        }
    });
    if let Some(path) = logging::init_cli(cli.verbose, log_file.as_deref()) {
        tracing::debug!(path = %path.display(), "writing run log");
    }

    match cli::dispatch(cli.command, config, cli.verbose).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::debug!(kind = e.kind(), "command failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
