//! Common test utilities for integration tests
//!
//! Provides a fixture wiring an [`Agent`] to the in-memory namespace store
//! and job substrate, with the default artifacts already present.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use clique_agent::adapters::memory::{InMemoryNamespaceStore, InMemorySubstrate};
use clique_agent::domain::models::{
    ClusterNode, ClusterStatus, Config, OperationId, OperationState, PersistentState,
    SpecletDocument,
};
use clique_agent::domain::ports::{NamespaceError, NamespaceStore, NodeType};
use clique_agent::services::{Agent, PassReport};
use tokio_util::sync::CancellationToken;

/// Agent plus the in-memory systems it talks to.
pub struct Fixture {
    pub store: Arc<InMemoryNamespaceStore>,
    pub substrate: Arc<InMemorySubstrate>,
    pub agent: Agent,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, |store| store)
    }

    /// Agent whose speclet reads never complete for the given clusters.
    pub fn with_hung_speclets(config: Config, aliases: &[&str]) -> Self {
        let hung = aliases
            .iter()
            .map(|alias| format!("{}/{alias}", config.agent.root))
            .collect();
        Self::build(config, |inner| Arc::new(HungSpecletStore { inner, hung }))
    }

    fn build(
        config: Config,
        wrap: impl FnOnce(Arc<InMemoryNamespaceStore>) -> Arc<dyn NamespaceStore>,
    ) -> Self {
        let store = Arc::new(InMemoryNamespaceStore::new());
        let defaults = &config.artifacts;
        store.put_file(&defaults.query_engine_path);
        store.put_file(&defaults.log_tailer_path);
        store.put_file(&defaults.trampoline_path);
        store.put_file(&defaults.data_bundle_path);

        let substrate = Arc::new(InMemorySubstrate::new());
        let agent = Agent::new(wrap(store.clone()), substrate.clone(), &config)
            .expect("agent should build with the built-in classifier");
        Self {
            store,
            substrate,
            agent,
            config,
        }
    }

    /// Simulate an agent restart: same namespace and substrate, fresh records.
    pub fn restarted(&self) -> Self {
        let agent = Agent::new(self.store.clone(), self.substrate.clone(), &self.config)
            .expect("agent should build with the built-in classifier");
        Self {
            store: self.store.clone(),
            substrate: self.substrate.clone(),
            agent,
            config: self.config.clone(),
        }
    }

    pub fn add_cluster(&self, alias: &str, speclet: serde_json::Value) -> String {
        self.store.put_cluster(&self.config.agent.root, alias, speclet)
    }

    /// Refresh the listing and run one pass.
    pub async fn pass(&self) -> PassReport {
        self.agent
            .collect_revisions()
            .await
            .expect("listing should succeed");
        self.agent
            .run_pass(&CancellationToken::new())
            .await
            .expect("pass should succeed")
    }

    pub async fn status(&self, alias: &str) -> ClusterStatus {
        self.agent
            .cluster_status(alias)
            .await
            .unwrap_or_else(|| panic!("cluster {alias} should be tracked"))
    }

    pub async fn operation_of(&self, alias: &str) -> OperationId {
        self.status(alias)
            .await
            .operation_id
            .unwrap_or_else(|| panic!("cluster {alias} should track an operation"))
    }

    pub async fn set_operation_state(&self, alias: &str, state: OperationState) {
        let id = self.operation_of(alias).await;
        assert!(self.substrate.set_state(&id, state));
    }
}

/// Namespace store that never answers speclet reads for some paths.
pub struct HungSpecletStore {
    inner: Arc<InMemoryNamespaceStore>,
    hung: HashSet<String>,
}

#[async_trait]
impl NamespaceStore for HungSpecletStore {
    async fn get_node_type(&self, path: &str) -> Result<NodeType, NamespaceError> {
        self.inner.get_node_type(path).await
    }

    async fn get_link_target(&self, path: &str) -> Result<String, NamespaceError> {
        self.inner.get_link_target(path).await
    }

    async fn list_clusters(&self, root: &str) -> Result<Vec<ClusterNode>, NamespaceError> {
        self.inner.list_clusters(root).await
    }

    async fn get_speclet(&self, path: &str) -> Result<SpecletDocument, NamespaceError> {
        if self.hung.contains(path) {
            std::future::pending::<()>().await;
        }
        self.inner.get_speclet(path).await
    }

    async fn get_persistent_state(
        &self,
        path: &str,
    ) -> Result<Option<PersistentState>, NamespaceError> {
        self.inner.get_persistent_state(path).await
    }

    async fn set_persistent_state(
        &self,
        path: &str,
        state: &PersistentState,
    ) -> Result<(), NamespaceError> {
        self.inner.set_persistent_state(path, state).await
    }
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
