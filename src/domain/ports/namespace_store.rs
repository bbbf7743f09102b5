//! Namespace store port - interface to the hierarchical attributed tree
//! that holds speclets and revision metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::NamespaceError;
use crate::domain::models::{ClusterNode, PersistentState, SpecletDocument};

/// Type of a namespace node, as far as the agent cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    MapNode,
    Link,
    File,
    Document,
}

/// Operations the agent needs from the namespace store.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Read the type of the node at `path` without following links.
    async fn get_node_type(&self, path: &str) -> Result<NodeType, NamespaceError>;

    /// Read the target path attribute of the link node at `path`.
    async fn get_link_target(&self, path: &str) -> Result<String, NamespaceError>;

    /// List every cluster node directly under `root` with its revision in one call.
    async fn list_clusters(&self, root: &str) -> Result<Vec<ClusterNode>, NamespaceError>;

    /// Read the speclet stored on the cluster node at `path`.
    async fn get_speclet(&self, path: &str) -> Result<SpecletDocument, NamespaceError>;

    /// Read agent state persisted on the cluster node, if any was written.
    async fn get_persistent_state(
        &self,
        path: &str,
    ) -> Result<Option<PersistentState>, NamespaceError>;

    /// Persist agent state on the cluster node.
    ///
    /// Must not advance the node's speclet revision.
    async fn set_persistent_state(
        &self,
        path: &str,
        state: &PersistentState,
    ) -> Result<(), NamespaceError>;
}
