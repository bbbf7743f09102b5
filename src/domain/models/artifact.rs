//! Resolved binary artifacts delivered to a cluster's operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Logical names of the artifacts every cluster operation carries.
pub const QUERY_ENGINE: &str = "query-engine";
pub const LOG_TAILER: &str = "log-tailer";
pub const TRAMPOLINE: &str = "trampoline";
pub const DATA_BUNDLE: &str = "data-bundle";

/// A named file with its fully resolved namespace path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Complete artifact set for one launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Files attached to the operation.
    pub manifest: Vec<Artifact>,
    /// Artifact name to resolved path, for the operation description only.
    pub description: BTreeMap<String, String>,
}

impl ArtifactSet {
    pub fn push(&mut self, artifact: Artifact) {
        self.description
            .insert(artifact.name.clone(), artifact.path.clone());
        self.manifest.push(artifact);
    }

    pub fn names(&self) -> Vec<&str> {
        self.manifest.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.description.contains_key(name)
    }
}
