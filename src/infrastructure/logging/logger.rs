use super::config::{LogConfig, LogFormat, RotationPolicy};
use anyhow::{Context, Result};
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Base name of rolling log files.
pub const LOG_FILE_NAME: &str = "clique-agent.log";

/// Logger implementation using tracing
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Initialize the global subscriber with the given configuration
    ///
    /// The returned value keeps the file writer alive; drop it only at exit.
    ///
    /// # Errors
    /// Returns an error if the level is invalid or a global subscriber is
    /// already installed
    pub fn init(config: &LogConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let env_filter = EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy();

        let (file_layer, guard) = match config.log_dir {
            Some(ref log_dir) => {
                let file_appender = match config.rotation {
                    RotationPolicy::Daily => rolling::daily(log_dir, LOG_FILE_NAME),
                    RotationPolicy::Hourly => rolling::hourly(log_dir, LOG_FILE_NAME),
                    RotationPolicy::Never => rolling::never(log_dir, LOG_FILE_NAME),
                };
                let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

                // Files are always JSON
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking_file)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_filter(env_filter.clone());
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let json_console = (config.enable_console && config.format == LogFormat::Json).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_filter(env_filter.clone())
        });

        let pretty_console = (config.enable_console && config.format == LogFormat::Pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter.clone())
        });

        tracing_subscriber::registry()
            .with(file_layer)
            .with(json_console)
            .with(pretty_console)
            .try_init()
            .context("Failed to install global tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            file_output = config.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

/// Parse log level string to Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));
        assert!(matches!(parse_log_level("TRACE"), Ok(Level::TRACE)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_invalid_level_is_rejected_before_install() {
        let config = LogConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(LoggerImpl::init(&config).is_err());
    }
}
