//! Agent pass loop.
//!
//! The agent owns one [`ClusterRecord`] per cluster node under the managed
//! root. Records are split into shards by a stable hash of the cluster
//! alias; a pass runs one task per shard, so a cluster is never reconciled
//! concurrently with itself.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentConfig, ClusterNode, ClusterRecord, ClusterStatus, Config, Speclet, TeardownPolicy,
};
use crate::domain::ports::{JobSubstrate, NamespaceStore};
use crate::services::cluster_controller::{ClusterController, ControllerConfig, ReconcileOutcome};
use crate::services::operation_classifier::ErrorClassifier;

/// Records of the clusters hashed to one shard.
#[derive(Default)]
struct ShardState {
    records: Mutex<HashMap<String, ClusterRecord>>,
    /// Held for a whole shard run so passes over one shard never overlap.
    running: Mutex<()>,
}

type Shard = Arc<ShardState>;

/// What one cluster step did.
#[derive(Debug, Default)]
struct ClusterStep {
    speclet_fetched: bool,
    outcome: Option<ReconcileOutcome>,
}

/// Whole milliseconds in `duration`, saturating.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Summary of one pass over every managed cluster.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub pass_number: u64,
    /// Clusters in the listing the pass worked from
    pub clusters: usize,
    pub created: Vec<String>,
    pub torn_down: Vec<String>,
    pub speclets_fetched: usize,
    pub outcomes: BTreeMap<String, ReconcileOutcome>,
    /// Error message per cluster whose step failed
    pub failures: BTreeMap<String, String>,
    pub cancelled: bool,
}

impl PassReport {
    fn merge(&mut self, other: Self) {
        self.created.extend(other.created);
        self.torn_down.extend(other.torn_down);
        self.speclets_fetched += other.speclets_fetched;
        self.outcomes.extend(other.outcomes);
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }

    /// Clusters whose step started, adopted or restarted an operation.
    pub fn launches(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| {
                matches!(
                    o,
                    ReconcileOutcome::Launched { .. } | ReconcileOutcome::Restarted { .. }
                )
            })
            .count()
    }
}

/// Everything a shard task needs, detached from the agent's lifetime.
#[derive(Clone)]
struct ShardWorker {
    store: Arc<dyn NamespaceStore>,
    controller: Arc<ClusterController>,
    shard: Shard,
    teardown_policy: TeardownPolicy,
    cluster_timeout: Duration,
}

/// Reconciles every cluster under the managed root.
pub struct Agent {
    store: Arc<dyn NamespaceStore>,
    controller: Arc<ClusterController>,
    shards: Vec<Shard>,
    listing: RwLock<Option<Vec<ClusterNode>>>,
    passes: AtomicU64,
    config: AgentConfig,
}

impl Agent {
    /// Build an agent with the built-in error classifier.
    pub fn new(
        store: Arc<dyn NamespaceStore>,
        substrate: Arc<dyn JobSubstrate>,
        config: &Config,
    ) -> DomainResult<Self> {
        let classifier = ErrorClassifier::builtin().map_err(|e| {
            DomainError::InvariantViolation(format!("built-in classifier rule is invalid: {e}"))
        })?;
        let controller = ClusterController::new(
            store.clone(),
            substrate,
            Arc::new(classifier),
            ControllerConfig::from_config(config),
        );
        Ok(Self::with_controller(
            store,
            Arc::new(controller),
            config.agent.clone(),
        ))
    }

    pub fn with_controller(
        store: Arc<dyn NamespaceStore>,
        controller: Arc<ClusterController>,
        config: AgentConfig,
    ) -> Self {
        let shards = (0..config.pass_workers.max(1))
            .map(|_| Arc::new(ShardState::default()))
            .collect();
        Self {
            store,
            controller,
            shards,
            listing: RwLock::new(None),
            passes: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, alias: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        alias.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// List cluster revisions under the managed root and cache the result.
    ///
    /// On failure the previous listing stays cached.
    pub async fn collect_revisions(&self) -> DomainResult<Vec<ClusterNode>> {
        let nodes = self.store.list_clusters(&self.config.root).await?;
        debug!(root = %self.config.root, clusters = nodes.len(), "collected cluster revisions");
        *self.listing.write().await = Some(nodes.clone());
        Ok(nodes)
    }

    /// Run one pass over every cluster in the cached listing.
    ///
    /// Per-cluster failures are recorded on the cluster and in the report;
    /// only a failure to obtain any listing fails the pass.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> DomainResult<PassReport> {
        let pass_number = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("pass", pass = pass_number);

        async {
            let cached = self.listing.read().await.clone();
            let nodes = match cached {
                Some(nodes) => nodes,
                None => self.collect_revisions().await?,
            };

            let mut report = PassReport {
                pass_number,
                clusters: nodes.len(),
                ..Default::default()
            };

            let mut assigned: Vec<Vec<ClusterNode>> = vec![Vec::new(); self.shards.len()];
            for node in nodes {
                let index = self.shard_index(&node.alias);
                assigned[index].push(node);
            }

            let mut handles = Vec::with_capacity(self.shards.len());
            for (index, nodes) in assigned.into_iter().enumerate() {
                let worker = self.worker(index);
                let cancel = cancel.clone();
                let shard_span = info_span!("shard", shard = index);
                handles.push(tokio::spawn(
                    async move { worker.run(nodes, &cancel).await }.instrument(shard_span),
                ));
            }

            for (index, joined) in join_all(handles).await.into_iter().enumerate() {
                match joined {
                    Ok(shard_report) => report.merge(shard_report),
                    Err(e) => error!(shard = index, error = %e, "shard task panicked"),
                }
            }

            info!(
                clusters = report.clusters,
                launches = report.launches(),
                failures = report.failures.len(),
                cancelled = report.cancelled,
                "pass completed"
            );
            Ok::<_, DomainError>(report)
        }
        .instrument(span)
        .await
    }

    fn worker(&self, index: usize) -> ShardWorker {
        ShardWorker {
            store: self.store.clone(),
            controller: self.controller.clone(),
            shard: self.shards[index].clone(),
            teardown_policy: self.config.teardown_policy,
            cluster_timeout: self.config.cluster_timeout(),
        }
    }

    /// Snapshot of every tracked cluster, sorted by alias.
    ///
    /// A cluster in the middle of a step shows its state from before the step.
    pub async fn status(&self) -> Vec<ClusterStatus> {
        let mut statuses = Vec::new();
        for shard in &self.shards {
            let records = shard.records.lock().await;
            statuses.extend(records.values().map(ClusterRecord::status));
        }
        statuses.sort_by(|a, b| a.alias.cmp(&b.alias));
        statuses
    }

    pub async fn cluster_status(&self, alias: &str) -> Option<ClusterStatus> {
        let shard = &self.shards[self.shard_index(alias)];
        shard.records.lock().await.get(alias).map(ClusterRecord::status)
    }
}

impl ShardWorker {
    async fn run(&self, nodes: Vec<ClusterNode>, cancel: &CancellationToken) -> PassReport {
        let mut report = PassReport::default();
        let _running = self.shard.running.lock().await;

        let listed: HashSet<&str> = nodes.iter().map(|n| n.alias.as_str()).collect();
        let vanished: Vec<ClusterRecord> = {
            let mut records = self.shard.records.lock().await;
            let aliases: Vec<String> = records
                .keys()
                .filter(|alias| !listed.contains(alias.as_str()))
                .cloned()
                .collect();
            aliases.iter().filter_map(|alias| records.remove(alias)).collect()
        };
        for record in vanished {
            report.torn_down.push(record.alias.clone());
            self.teardown(record).await;
        }

        for node in &nodes {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            // Status reads see the record as of before this step; the copy
            // is written back however the step ends.
            let mut record = {
                let mut records = self.shard.records.lock().await;
                if !records.contains_key(&node.alias) {
                    report.created.push(node.alias.clone());
                }
                records
                    .entry(node.alias.clone())
                    .or_insert_with(|| ClusterRecord::from_node(node))
                    .clone()
            };

            let step = tokio::time::timeout(self.cluster_timeout, self.step(node, &mut record));
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = step => Some(result),
            };

            match result {
                None => {
                    debug!(cluster = %node.alias, "cluster step interrupted by cancellation");
                    report.cancelled = true;
                }
                Some(Ok(Ok(step))) => {
                    if step.speclet_fetched {
                        report.speclets_fetched += 1;
                    }
                    if let Some(outcome) = step.outcome {
                        report.outcomes.insert(node.alias.clone(), outcome);
                    }
                }
                Some(Ok(Err(e))) => {
                    report.failures.insert(node.alias.clone(), e.to_string());
                }
                Some(Err(_)) => {
                    let e = DomainError::Timeout {
                        cluster: node.alias.clone(),
                        timeout_ms: duration_ms(self.cluster_timeout),
                    };
                    warn!(cluster = %node.alias, error = %e, "cluster step timed out");
                    record.record_error(&e);
                    report.failures.insert(node.alias.clone(), e.to_string());
                }
            }

            self.shard
                .records
                .lock()
                .await
                .insert(node.alias.clone(), record);
            if report.cancelled {
                break;
            }
        }

        report
    }

    /// Resume persisted state, refresh the speclet and reconcile one cluster.
    async fn step(
        &self,
        node: &ClusterNode,
        record: &mut ClusterRecord,
    ) -> DomainResult<ClusterStep> {
        if !record.persisted_state_read {
            self.load_persistent_state(record).await;
        }

        let mut step = ClusterStep::default();
        if record.needs_speclet_fetch(node.revision) {
            if let Err(e) = self.fetch_speclet(record).await {
                warn!(cluster = %node.alias, error = %e, "failed to read speclet");
                record.record_error(&e);
                return Err(e);
            }
            step.speclet_fetched = true;
        }
        if record.speclet.is_some() {
            step.outcome = Some(self.controller.reconcile(record).await?);
        }
        Ok(step)
    }

    async fn load_persistent_state(&self, record: &mut ClusterRecord) {
        match self.store.get_persistent_state(&record.path).await {
            Ok(Some(state)) => {
                info!(
                    cluster = %record.alias,
                    operation_id = ?state.operation_id,
                    incarnation = state.incarnation_index,
                    "resuming cluster from persisted state"
                );
                record.restore(state);
            }
            Ok(None) => info!(cluster = %record.alias, "new cluster discovered"),
            Err(e) => {
                warn!(cluster = %record.alias, error = %e, "failed to read persisted state");
            }
        }
        record.persisted_state_read = true;
    }

    async fn fetch_speclet(&self, record: &mut ClusterRecord) -> DomainResult<()> {
        let document = self.store.get_speclet(&record.path).await?;
        let speclet = Speclet::from_document(&document)?;
        debug!(cluster = %record.alias, revision = %document.revision, "speclet read");
        record.set_desired(speclet, document.revision);
        Ok(())
    }

    async fn teardown(&self, mut record: ClusterRecord) {
        match self.teardown_policy {
            TeardownPolicy::Leave => {
                info!(
                    cluster = %record.alias,
                    operation_id = ?record.operation_id,
                    "cluster node removed; leaving its operation running"
                );
            }
            TeardownPolicy::Abort => {
                let step = self.controller.teardown(&mut record);
                match tokio::time::timeout(self.cluster_timeout, step).await {
                    Ok(Ok(())) => info!(cluster = %record.alias, "cluster node removed; operation stopped"),
                    Ok(Err(e)) => {
                        error!(cluster = %record.alias, error = %e, "failed to stop operation of removed cluster");
                    }
                    Err(_) => {
                        error!(cluster = %record.alias, "timed out stopping operation of removed cluster");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryNamespaceStore, InMemorySubstrate};
    use crate::domain::models::{ArtifactDefaults, ClusterHealth, OperationState};
    use serde_json::json;

    fn fixture(config: Config) -> (Arc<InMemoryNamespaceStore>, Arc<InMemorySubstrate>, Agent) {
        let store = Arc::new(InMemoryNamespaceStore::new());
        let defaults = ArtifactDefaults::default();
        for path in [
            &defaults.query_engine_path,
            &defaults.log_tailer_path,
            &defaults.trampoline_path,
            &defaults.data_bundle_path,
        ] {
            store.put_file(path);
        }
        let substrate = Arc::new(InMemorySubstrate::new());
        let agent = Agent::new(store.clone(), substrate.clone(), &config).unwrap();
        (store, substrate, agent)
    }

    #[test]
    fn test_shard_index_is_stable() {
        let (_, _, agent) = fixture(Config::default());
        let first = agent.shard_index("alpha");
        assert_eq!(agent.shard_index("alpha"), first);
        assert!(first < agent.shard_count());
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_zero_workers_still_has_one_shard() {
        let mut config = Config::default();
        config.agent.pass_workers = 0;
        let (_, _, agent) = fixture(config);
        assert_eq!(agent.shard_count(), 1);
    }

    #[tokio::test]
    async fn test_pass_collects_listing_when_none_cached() {
        let (store, substrate, agent) = fixture(Config::default());
        store.put_cluster(&agent.config().root, "alpha", json!({}));

        let report = agent.run_pass(&CancellationToken::new()).await.unwrap();

        assert_eq!(store.list_calls(), 1);
        assert_eq!(report.clusters, 1);
        assert_eq!(report.created, vec!["alpha".to_string()]);
        assert_eq!(report.launches(), 1);
        assert_eq!(substrate.start_calls(), 1);

        agent.run_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_speclet_refetched_only_on_revision_change() {
        let (store, _, agent) = fixture(Config::default());
        let path = store.put_cluster(&agent.config().root, "alpha", json!({}));
        let cancel = CancellationToken::new();

        agent.run_pass(&cancel).await.unwrap();
        agent.run_pass(&cancel).await.unwrap();
        assert_eq!(store.speclet_reads(), 1);

        store.update_speclet(&path, json!({"pool": "analytics"}));
        agent.collect_revisions().await.unwrap();
        let report = agent.run_pass(&cancel).await.unwrap();

        assert_eq!(store.speclet_reads(), 2);
        assert_eq!(report.speclets_fetched, 1);
    }

    #[tokio::test]
    async fn test_invalid_speclet_document_is_isolated() {
        let (store, substrate, agent) = fixture(Config::default());
        store.put_cluster(&agent.config().root, "broken", json!({"instance_count": "many"}));
        store.put_cluster(&agent.config().root, "healthy", json!({}));

        let report = agent.run_pass(&CancellationToken::new()).await.unwrap();

        assert!(report.failures.contains_key("broken"));
        assert!(report.outcomes.contains_key("healthy"));
        assert_eq!(substrate.start_calls(), 1);
        let broken = agent.cluster_status("broken").await.unwrap();
        assert_eq!(broken.health, ClusterHealth::InvalidSpeclet);
    }

    #[tokio::test]
    async fn test_cancelled_pass_reconciles_nothing() {
        let (store, substrate, agent) = fixture(Config::default());
        store.put_cluster(&agent.config().root, "alpha", json!({}));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = agent.run_pass(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(substrate.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_status_lists_all_clusters_sorted() {
        let (store, substrate, agent) = fixture(Config::default());
        for alias in ["gamma", "alpha", "beta"] {
            store.put_cluster(&agent.config().root, alias, json!({}));
        }
        agent.run_pass(&CancellationToken::new()).await.unwrap();

        let statuses = agent.status().await;
        let aliases: Vec<_> = statuses.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, vec!["alpha", "beta", "gamma"]);
        for status in &statuses {
            let id = status.operation_id.as_ref().unwrap();
            assert_eq!(substrate.state(id), Some(OperationState::Initializing));
            assert_eq!(status.incarnation, 1);
        }
    }
}
