//! Fleet simulation CLI command.
//!
//! Seeds the in-memory namespace from a fleet file and runs the agent
//! daemon against it with the in-memory job substrate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;

use crate::adapters::memory::{InMemoryNamespaceStore, InMemorySubstrate};
use crate::cli::load_config;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{ClusterStatus, Config};
use crate::services::agent::{Agent, PassReport};
use crate::services::agent_daemon::{AgentDaemon, AgentDaemonConfig, AgentEvent, StopReason};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Fleet file describing clusters and namespace contents (YAML)
    #[arg(short, long)]
    pub fleet: PathBuf,

    /// Number of passes to run
    #[arg(short, long, default_value = "1")]
    pub passes: u64,

    /// Override both the pass and the revision collection period
    #[arg(long)]
    pub period_ms: Option<u64>,
}

/// Contents of a fleet file.
#[derive(Debug, Default, Deserialize)]
pub struct Fleet {
    #[serde(default)]
    pub namespace: FleetNamespace,

    /// Speclet per cluster alias
    #[serde(default)]
    pub clusters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FleetNamespace {
    #[serde(default)]
    pub files: Vec<String>,

    /// Link path to target path
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

impl Fleet {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse fleet file {}", path.display()))
    }

    /// Populate `store` with the default artifacts, then this fleet's nodes.
    pub fn seed(&self, store: &InMemoryNamespaceStore, config: &Config) {
        let defaults = &config.artifacts;
        for path in [
            &defaults.query_engine_path,
            &defaults.log_tailer_path,
            &defaults.trampoline_path,
            &defaults.data_bundle_path,
        ] {
            if !self.namespace.links.contains_key(path) {
                store.put_file(path);
            }
        }
        for path in &self.namespace.files {
            store.put_file(path);
        }
        for (path, target) in &self.namespace.links {
            store.put_link(path, target);
        }
        for (alias, speclet) in &self.clusters {
            store.put_cluster(&config.agent.root, alias, speclet.clone());
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub passes: Vec<PassReport>,
    pub failed_passes: Vec<String>,
    pub stop_reason: Option<String>,
    pub operations_started: usize,
    pub clusters: Vec<ClusterStatus>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Ran {} pass(es), {} operation start(s) submitted",
            self.passes.len(),
            self.operations_started
        )];
        for failure in &self.failed_passes {
            lines.push(format!("Pass failed: {failure}"));
        }
        if self.clusters.is_empty() {
            lines.push("No clusters tracked.".to_string());
            return lines.join("\n");
        }

        lines.push(String::new());
        lines.push(format!(
            "{:<20} {:<18} {:<38} {:<14} {:<5} {}",
            "CLUSTER", "HEALTH", "OPERATION", "STATE", "INC", "LAST ERROR"
        ));
        lines.push("-".repeat(120));
        for status in &self.clusters {
            lines.push(format!(
                "{:<20} {:<18} {:<38} {:<14} {:<5} {}",
                truncate(&status.alias, 20),
                status.health.as_str(),
                status
                    .operation_id
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ToString::to_string),
                status
                    .operation_state
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
                status.incarnation,
                status
                    .last_error
                    .as_ref()
                    .map_or_else(String::new, |e| truncate(&e.message, 40)),
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&PathBuf>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let fleet = Fleet::from_path(&args.fleet)?;

    let store = Arc::new(InMemoryNamespaceStore::new());
    let substrate = Arc::new(InMemorySubstrate::new());
    fleet.seed(&store, &config);

    let agent = Arc::new(
        Agent::new(store.clone(), substrate.clone(), &config)
            .context("Failed to construct agent")?,
    );

    let mut daemon_config =
        AgentDaemonConfig::from_agent_config(&config.agent).with_max_passes(args.passes);
    if let Some(period_ms) = args.period_ms {
        daemon_config.pass_period = Duration::from_millis(period_ms.max(1));
        daemon_config.revision_collect_period = Duration::from_millis(period_ms.max(1));
    }

    let daemon = AgentDaemon::new(agent.clone(), daemon_config);
    let handle = daemon.handle();
    let mut events = daemon.run().await;

    let mut passes = Vec::new();
    let mut failed_passes = Vec::new();
    let mut stop_reason = None;
    let mut stopping = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(AgentEvent::PassCompleted { report, .. }) => passes.push(report),
                Some(AgentEvent::PassFailed { pass_number, error }) => {
                    failed_passes.push(format!("#{pass_number}: {error}"));
                }
                Some(AgentEvent::Stopped { reason }) => stop_reason = Some(reason),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                tracing::info!("interrupt received, stopping agent");
                stopping = true;
                handle.stop();
            }
        }
    }

    let out = RunOutput {
        passes,
        failed_passes,
        stop_reason: stop_reason.map(|r| match r {
            StopReason::Requested => "requested".to_string(),
            StopReason::PassLimitReached => "pass_limit_reached".to_string(),
            StopReason::ChannelClosed => "channel_closed".to_string(),
        }),
        operations_started: substrate.start_calls(),
        clusters: agent.status().await,
    };
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NamespaceStore;

    #[tokio::test]
    async fn test_fleet_seeding() {
        let yaml = r#"
namespace:
  files:
    - "//home/bin/engine-24.3"
  links:
    "//sys/bin/query-engine/query-engine": "//home/bin/engine-24.3"
clusters:
  alpha:
    pool: analytics
  beta:
    instance_count: 3
"#;
        let fleet: Fleet = serde_yaml::from_str(yaml).unwrap();
        let config = Config::default();
        let store = InMemoryNamespaceStore::new();

        fleet.seed(&store, &config);

        let listed = store.list_clusters(&config.agent.root).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(
            store
                .get_link_target(&config.artifacts.query_engine_path)
                .await
                .unwrap(),
            "//home/bin/engine-24.3"
        );
    }

    #[test]
    fn test_empty_fleet_parses() {
        let fleet: Fleet = serde_yaml::from_str("{}").unwrap();
        assert!(fleet.clusters.is_empty());
        assert!(fleet.namespace.files.is_empty());
    }
}
