use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project configuration file, relative to the working directory.
pub const PROJECT_CONFIG_PATH: &str = ".clique-agent/config.yaml";

/// Optional local overrides of [`PROJECT_CONFIG_PATH`].
pub const LOCAL_CONFIG_PATH: &str = ".clique-agent/local.yaml";

/// Prefix of environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "CLIQUE_AGENT_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Managed root cannot be empty")]
    EmptyRoot,

    #[error("Invalid managed root: {0}. Must be an absolute namespace path starting with //")]
    InvalidRoot(String),

    #[error("Robot username cannot be empty")]
    EmptyRobotUsername,

    #[error("Alias prefix cannot be empty")]
    EmptyAliasPrefix,

    #[error("Invalid pass_period_ms: {0}. Must be at least 1")]
    InvalidPassPeriod(u64),

    #[error("Invalid revision_collect_period_ms: {0}. Must be at least 1")]
    InvalidRevisionCollectPeriod(u64),

    #[error("Invalid pass_workers: {0}. Must be between 1 and 256")]
    InvalidPassWorkers(usize),

    #[error("Invalid cluster_timeout_ms: {0}. Must be at least 1")]
    InvalidClusterTimeout(u64),

    #[error("Invalid artifact path for {name}: {path}. Must start with //")]
    InvalidArtifactPath { name: &'static str, path: String },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .clique-agent/config.yaml
    /// 3. .clique-agent/local.yaml (optional)
    /// 4. Environment variables (CLIQUE_AGENT_* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(PROJECT_CONFIG_PATH))
            .merge(Yaml::file(LOCAL_CONFIG_PATH))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let agent = &config.agent;

        if agent.root.is_empty() {
            return Err(ConfigError::EmptyRoot);
        }
        if !agent.root.starts_with("//") {
            return Err(ConfigError::InvalidRoot(agent.root.clone()));
        }
        if agent.robot_username.is_empty() {
            return Err(ConfigError::EmptyRobotUsername);
        }
        if agent.alias_prefix.is_empty() {
            return Err(ConfigError::EmptyAliasPrefix);
        }

        if agent.pass_period_ms == 0 {
            return Err(ConfigError::InvalidPassPeriod(agent.pass_period_ms));
        }
        if agent.revision_collect_period_ms == 0 {
            return Err(ConfigError::InvalidRevisionCollectPeriod(
                agent.revision_collect_period_ms,
            ));
        }
        if agent.pass_workers == 0 || agent.pass_workers > 256 {
            return Err(ConfigError::InvalidPassWorkers(agent.pass_workers));
        }
        if agent.cluster_timeout_ms == 0 {
            return Err(ConfigError::InvalidClusterTimeout(agent.cluster_timeout_ms));
        }

        let artifacts = &config.artifacts;
        for (name, path) in [
            ("query_engine_path", &artifacts.query_engine_path),
            ("log_tailer_path", &artifacts.log_tailer_path),
            ("trampoline_path", &artifacts.trampoline_path),
            ("data_bundle_path", &artifacts.data_bundle_path),
        ] {
            if !path.starts_with("//") {
                return Err(ConfigError::InvalidArtifactPath {
                    name,
                    path: path.clone(),
                });
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::TeardownPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.root, "//sys/clique/clusters");
        assert_eq!(config.agent.pass_workers, 8);
        assert_eq!(config.agent.teardown_policy, TeardownPolicy::Leave);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
agent:
  root: //home/analytics/cliques
  pass_workers: 4
  cluster_timeout_ms: 15000
  teardown_policy: abort
artifacts:
  query_engine_path: //home/analytics/bin/query-engine
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.agent.root, "//home/analytics/cliques");
        assert_eq!(config.agent.pass_workers, 4);
        assert_eq!(config.agent.cluster_timeout_ms, 15000);
        assert_eq!(config.agent.teardown_policy, TeardownPolicy::Abort);
        assert_eq!(config.agent.pass_period_ms, 5000);
        assert_eq!(
            config.artifacts.query_engine_path,
            "//home/analytics/bin/query-engine"
        );
        assert_eq!(
            config.artifacts.log_tailer_path,
            "//sys/bin/log-tailer/log-tailer"
        );
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_empty_root() {
        let mut config = Config::default();
        config.agent.root = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyRoot)
        ));
    }

    #[test]
    fn test_validate_relative_root() {
        let mut config = Config::default();
        config.agent.root = "sys/clusters".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidRoot(root)) => assert_eq!(root, "sys/clusters"),
            other => panic!("Expected InvalidRoot error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.agent.pass_workers = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPassWorkers(0))
        ));
    }

    #[test]
    fn test_validate_zero_periods() {
        let mut config = Config::default();
        config.agent.pass_period_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPassPeriod(0))
        ));

        let mut config = Config::default();
        config.agent.revision_collect_period_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRevisionCollectPeriod(0))
        ));

        let mut config = Config::default();
        config.agent.cluster_timeout_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidClusterTimeout(0))
        ));
    }

    #[test]
    fn test_validate_empty_alias_prefix() {
        let mut config = Config::default();
        config.agent.alias_prefix = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyAliasPrefix)
        ));
    }

    #[test]
    fn test_validate_artifact_path() {
        let mut config = Config::default();
        config.artifacts.trampoline_path = "/usr/bin/trampoline".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidArtifactPath { name, .. }) => {
                assert_eq!(name, "trampoline_path");
            }
            other => panic!("Expected InvalidArtifactPath error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_settings() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogRotation(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "agent:\n  pass_period_ms: 1000\n  alias_prefix: \"clique-\"\nlogging:\n  level: warn"
        )
        .unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();

        assert_eq!(config.agent.pass_period_ms, 1000);
        assert_eq!(config.agent.alias_prefix, "clique-");
        assert_eq!(config.agent.pass_workers, 8);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "agent:\n  pass_workers: 0").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "agent:\n  pass_workers: 2\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "agent:\n  pass_workers: 16\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.agent.pass_workers, 16, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
