use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Reconciliation loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Fallback artifact paths for speclets that do not pin their own
    #[serde(default)]
    pub artifacts: ArtifactDefaults,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What to do with a live operation whose cluster node disappeared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Forget the record and leave the operation running
    #[default]
    Leave,
    /// Abort the operation before forgetting the record
    Abort,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Namespace directory whose children are the managed clusters
    #[serde(default = "default_root")]
    pub root: String,

    /// Service identity operations are started on behalf of
    #[serde(default = "default_robot_username")]
    pub robot_username: String,

    /// Period between reconciliation passes
    #[serde(default = "default_pass_period_ms")]
    pub pass_period_ms: u64,

    /// Period between batched revision listings
    #[serde(default = "default_revision_collect_period_ms")]
    pub revision_collect_period_ms: u64,

    /// Number of record shards, each reconciled by one task per pass
    #[serde(default = "default_pass_workers")]
    pub pass_workers: usize,

    /// Upper bound on a single cluster's reconciliation
    #[serde(default = "default_cluster_timeout_ms")]
    pub cluster_timeout_ms: u64,

    #[serde(default)]
    pub teardown_policy: TeardownPolicy,

    /// Reject speclets with empty ACL subjects or permissions
    #[serde(default = "default_validate_acl")]
    pub validate_acl: bool,

    /// Prefix of operation aliases; the cluster alias follows it
    #[serde(default = "default_alias_prefix")]
    pub alias_prefix: String,
}

fn default_root() -> String {
    "//sys/clique/clusters".to_string()
}

fn default_robot_username() -> String {
    "robot-clique-agent".to_string()
}

const fn default_pass_period_ms() -> u64 {
    5_000
}

const fn default_revision_collect_period_ms() -> u64 {
    30_000
}

const fn default_pass_workers() -> usize {
    8
}

const fn default_cluster_timeout_ms() -> u64 {
    60_000
}

const fn default_validate_acl() -> bool {
    true
}

fn default_alias_prefix() -> String {
    "*".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            robot_username: default_robot_username(),
            pass_period_ms: default_pass_period_ms(),
            revision_collect_period_ms: default_revision_collect_period_ms(),
            pass_workers: default_pass_workers(),
            cluster_timeout_ms: default_cluster_timeout_ms(),
            teardown_policy: TeardownPolicy::default(),
            validate_acl: default_validate_acl(),
            alias_prefix: default_alias_prefix(),
        }
    }
}

impl AgentConfig {
    pub const fn pass_period(&self) -> Duration {
        Duration::from_millis(self.pass_period_ms)
    }

    pub const fn revision_collect_period(&self) -> Duration {
        Duration::from_millis(self.revision_collect_period_ms)
    }

    pub const fn cluster_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster_timeout_ms)
    }
}

/// Default artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactDefaults {
    #[serde(default = "default_query_engine_path")]
    pub query_engine_path: String,

    #[serde(default = "default_log_tailer_path")]
    pub log_tailer_path: String,

    #[serde(default = "default_trampoline_path")]
    pub trampoline_path: String,

    #[serde(default = "default_data_bundle_path")]
    pub data_bundle_path: String,
}

fn default_query_engine_path() -> String {
    "//sys/bin/query-engine/query-engine".to_string()
}

fn default_log_tailer_path() -> String {
    "//sys/bin/log-tailer/log-tailer".to_string()
}

fn default_trampoline_path() -> String {
    "//sys/bin/clique-trampoline/clique-trampoline".to_string()
}

fn default_data_bundle_path() -> String {
    "//sys/clique/data-bundle/latest".to_string()
}

impl Default for ArtifactDefaults {
    fn default() -> Self {
        Self {
            query_engine_path: default_query_engine_path(),
            log_tailer_path: default_log_tailer_path(),
            trampoline_path: default_trampoline_path(),
            data_bundle_path: default_data_bundle_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation of file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
