use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::config::LoggingConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to stdout)
    pub log_dir: Option<PathBuf>,

    /// Enable console (stderr) logging
    #[serde(default = "default_true")]
    pub enable_console: bool,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    /// Unknown format or rotation names fall back to the defaults; the
    /// config loader rejects them before this point.
    fn from(config: &LoggingConfig) -> Self {
        let format = match config.format.as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        let rotation = match config.rotation.as_str() {
            "hourly" => RotationPolicy::Hourly,
            "never" => RotationPolicy::Never,
            _ => RotationPolicy::Daily,
        };
        Self {
            level: config.level.clone(),
            format,
            log_dir: config.log_dir.as_ref().map(PathBuf::from),
            enable_console: true,
            rotation,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
