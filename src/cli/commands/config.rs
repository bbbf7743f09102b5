//! Configuration CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all overrides
    Show,
    /// Load and validate the configuration
    Check,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigShowOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigCheckOutput {
    pub valid: bool,
    pub root: String,
    pub pass_workers: usize,
    pub message: String,
}

impl CommandOutput for ConfigCheckOutput {
    fn to_human(&self) -> String {
        format!(
            "{}\n  managed root: {}\n  pass workers: {}",
            self.message, self.root, self.pass_workers
        )
    }
}

pub async fn execute(args: ConfigArgs, config_path: Option<&PathBuf>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path).context("Configuration is invalid")?;

    match args.command {
        ConfigCommands::Show => output(&ConfigShowOutput { config }, json_mode),
        ConfigCommands::Check => {
            let out = ConfigCheckOutput {
                valid: true,
                root: config.agent.root.clone(),
                pass_workers: config.agent.pass_workers,
                message: "Configuration is valid".to_string(),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
