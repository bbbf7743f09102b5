//! In-memory namespace store.
//!
//! Keeps a flat path-to-node map with a store-wide revision counter, the way
//! the real store bumps a node's revision on every content mutation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::models::{ClusterNode, PersistentState, Revision, SpecletDocument};
use crate::domain::ports::{NamespaceError, NamespaceStore, NodeType};

#[derive(Debug, Clone)]
struct Node {
    node_type: NodeType,
    revision: Revision,
    link_target: Option<String>,
    speclet: Option<serde_json::Value>,
    persistent_state: Option<PersistentState>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    last_revision: u64,
    listing_failure: Option<NamespaceError>,
}

impl Inner {
    fn bump(&mut self) -> Revision {
        self.last_revision += 1;
        Revision(self.last_revision)
    }

    fn insert(&mut self, path: &str, node_type: NodeType) -> &mut Node {
        let revision = self.bump();
        let node = self.nodes.entry(path.to_string()).or_insert_with(|| Node {
            node_type,
            revision,
            link_target: None,
            speclet: None,
            persistent_state: None,
        });
        node.node_type = node_type;
        node.revision = revision;
        node
    }
}

/// Namespace store backed by process memory, for tests and local simulation.
#[derive(Debug, Default)]
pub struct InMemoryNamespaceStore {
    inner: Mutex<Inner>,
    link_reads: AtomicUsize,
    speclet_reads: AtomicUsize,
    list_calls: AtomicUsize,
}

impl InMemoryNamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a plain file node.
    pub fn put_file(&self, path: &str) {
        let mut inner = self.lock();
        let node = inner.insert(path, NodeType::File);
        node.link_target = None;
    }

    /// Create or replace a link node pointing at `target`.
    pub fn put_link(&self, path: &str, target: &str) {
        let mut inner = self.lock();
        let node = inner.insert(path, NodeType::Link);
        node.link_target = Some(target.to_string());
    }

    /// Create a cluster node `<root>/<alias>` holding `speclet`; returns its path.
    pub fn put_cluster(&self, root: &str, alias: &str, speclet: serde_json::Value) -> String {
        let path = format!("{root}/{alias}");
        let mut inner = self.lock();
        let node = inner.insert(&path, NodeType::MapNode);
        node.speclet = Some(speclet);
        path
    }

    /// Replace the speclet of an existing cluster node, advancing its revision.
    pub fn update_speclet(&self, path: &str, speclet: serde_json::Value) -> Option<Revision> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(path) {
            return None;
        }
        let revision = inner.bump();
        let node = inner.nodes.get_mut(path)?;
        node.speclet = Some(speclet);
        node.revision = revision;
        Some(revision)
    }

    pub fn remove(&self, path: &str) -> bool {
        self.lock().nodes.remove(path).is_some()
    }

    pub fn revision(&self, path: &str) -> Option<Revision> {
        self.lock().nodes.get(path).map(|n| n.revision)
    }

    pub fn persistent_state(&self, path: &str) -> Option<PersistentState> {
        self.lock()
            .nodes
            .get(path)
            .and_then(|n| n.persistent_state.clone())
    }

    /// Make every subsequent `list_clusters` call fail with `error` (or succeed again on `None`).
    pub fn set_listing_failure(&self, error: Option<NamespaceError>) {
        self.lock().listing_failure = error;
    }

    pub fn link_reads(&self) -> usize {
        self.link_reads.load(Ordering::SeqCst)
    }

    pub fn speclet_reads(&self) -> usize {
        self.speclet_reads.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NamespaceStore for InMemoryNamespaceStore {
    async fn get_node_type(&self, path: &str) -> Result<NodeType, NamespaceError> {
        self.lock()
            .nodes
            .get(path)
            .map(|n| n.node_type)
            .ok_or_else(|| NamespaceError::NotFound(path.to_string()))
    }

    async fn get_link_target(&self, path: &str) -> Result<String, NamespaceError> {
        self.link_reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| NamespaceError::NotFound(path.to_string()))?;
        node.link_target.clone().ok_or_else(|| NamespaceError::Malformed {
            path: path.to_string(),
            reason: "node has no target path attribute".to_string(),
        })
    }

    async fn list_clusters(&self, root: &str) -> Result<Vec<ClusterNode>, NamespaceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        if let Some(error) = &inner.listing_failure {
            return Err(error.clone());
        }

        let prefix = format!("{root}/");
        Ok(inner
            .nodes
            .iter()
            .filter(|(_, node)| node.speclet.is_some())
            .filter_map(|(path, node)| {
                let alias = path.strip_prefix(&prefix)?;
                if alias.is_empty() || alias.contains('/') {
                    return None;
                }
                Some(ClusterNode {
                    alias: alias.to_string(),
                    path: path.clone(),
                    revision: node.revision,
                })
            })
            .collect())
    }

    async fn get_speclet(&self, path: &str) -> Result<SpecletDocument, NamespaceError> {
        self.speclet_reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| NamespaceError::NotFound(path.to_string()))?;
        let content = node.speclet.clone().ok_or_else(|| NamespaceError::Malformed {
            path: path.to_string(),
            reason: "node has no speclet".to_string(),
        })?;
        Ok(SpecletDocument {
            revision: node.revision,
            content,
        })
    }

    async fn get_persistent_state(
        &self,
        path: &str,
    ) -> Result<Option<PersistentState>, NamespaceError> {
        let inner = self.lock();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| NamespaceError::NotFound(path.to_string()))?;
        Ok(node.persistent_state.clone())
    }

    async fn set_persistent_state(
        &self,
        path: &str,
        state: &PersistentState,
    ) -> Result<(), NamespaceError> {
        let mut inner = self.lock();
        let node = inner
            .nodes
            .get_mut(path)
            .ok_or_else(|| NamespaceError::NotFound(path.to_string()))?;
        node.persistent_state = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_clusters_returns_direct_children_only() {
        let store = InMemoryNamespaceStore::new();
        store.put_cluster("//sys/clique/clusters", "alpha", json!({}));
        store.put_cluster("//sys/clique/clusters", "beta", json!({}));
        store.put_file("//sys/clique/clusters/alpha/logs");
        store.put_cluster("//sys/elsewhere", "gamma", json!({}));

        let mut aliases: Vec<_> = store
            .list_clusters("//sys/clique/clusters")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.alias)
            .collect();
        aliases.sort();

        assert_eq!(aliases, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_update_speclet_advances_revision() {
        let store = InMemoryNamespaceStore::new();
        let path = store.put_cluster("//root", "alpha", json!({}));
        let before = store.revision(&path).unwrap();

        let after = store.update_speclet(&path, json!({"pool": "p"})).unwrap();

        assert!(after > before);
        let doc = store.get_speclet(&path).await.unwrap();
        assert_eq!(doc.revision, after);
        assert_eq!(doc.content["pool"], "p");
    }

    #[tokio::test]
    async fn test_persistent_state_does_not_touch_revision() {
        let store = InMemoryNamespaceStore::new();
        let path = store.put_cluster("//root", "alpha", json!({}));
        let before = store.revision(&path);

        store
            .set_persistent_state(&path, &PersistentState::default())
            .await
            .unwrap();

        assert_eq!(store.revision(&path), before);
        assert_eq!(
            store.get_persistent_state(&path).await.unwrap(),
            Some(PersistentState::default())
        );
    }

    #[tokio::test]
    async fn test_listing_failure_injection() {
        let store = InMemoryNamespaceStore::new();
        store.set_listing_failure(Some(NamespaceError::Transport("down".to_string())));
        assert!(store.list_clusters("//root").await.is_err());

        store.set_listing_failure(None);
        assert!(store.list_clusters("//root").await.is_ok());
    }
}
