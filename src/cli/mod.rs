//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Parser)]
#[command(name = "clique-agent")]
#[command(about = "Keeps query-engine clusters in sync with their speclets", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file; defaults to .clique-agent/config.yaml
    #[arg(short, long, global = true, env = "CLIQUE_AGENT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent against a simulated fleet
    Run(commands::run::RunArgs),

    /// Show how one speclet differs from another
    Diff(commands::diff::DiffArgs),

    /// Inspect the effective configuration
    Config(commands::config::ConfigArgs),
}

/// Load configuration from `path`, or hierarchically when none is given.
pub fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Report a command failure and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({ "success": false, "error": err.to_string(), "causes": chain });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
