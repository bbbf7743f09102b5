//! clique-agent CLI entry point.

use clap::Parser;

use clique_agent::cli::{load_config, Cli, Commands};
use clique_agent::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging follows the loaded configuration; a config that fails to load
    // is reported by the command itself.
    let log_config = load_config(cli.config.as_ref())
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Run(args) => {
            clique_agent::cli::commands::run::execute(args, cli.config.as_ref(), cli.json).await
        }
        Commands::Diff(args) => clique_agent::cli::commands::diff::execute(args, cli.json).await,
        Commands::Config(args) => {
            clique_agent::cli::commands::config::execute(args, cli.config.as_ref(), cli.json).await
        }
    };

    if let Err(err) = result {
        clique_agent::cli::handle_error(err, cli.json);
    }
}
