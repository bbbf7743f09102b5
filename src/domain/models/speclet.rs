//! Speclet domain model.
//!
//! A speclet is the desired declarative configuration of one cluster. It is
//! stored on the cluster's namespace node and re-read whenever the node's
//! revision advances.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::acl::AclEntry;
use crate::domain::errors::{DomainError, DomainResult};

/// Per-node change counter maintained by the namespace store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw speclet content as read from the namespace, with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecletDocument {
    pub revision: Revision,
    pub content: serde_json::Value,
}

/// Resource section of a speclet, embedded flat into [`Speclet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpeclet {
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    #[serde(default = "default_instance_cpu")]
    pub instance_cpu: u32,

    #[serde(default = "default_instance_memory_bytes")]
    pub instance_memory_bytes: u64,
}

const fn default_instance_count() -> u32 {
    1
}

const fn default_instance_cpu() -> u32 {
    8
}

const fn default_instance_memory_bytes() -> u64 {
    16 * 1024 * 1024 * 1024
}

impl Default for ResourceSpeclet {
    fn default() -> Self {
        Self {
            instance_count: default_instance_count(),
            instance_cpu: default_instance_cpu(),
            instance_memory_bytes: default_instance_memory_bytes(),
        }
    }
}

/// Desired configuration of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speclet {
    /// Inactive clusters have their operation aborted and are not restarted.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Substrate pool the operation runs in.
    #[serde(default)]
    pub pool: Option<String>,

    /// When false, speclet changes are recorded but never restart a running operation.
    #[serde(default = "default_true")]
    pub restart_on_speclet_change: bool,

    #[serde(default)]
    pub query_engine_path: Option<String>,

    #[serde(default)]
    pub log_tailer_path: Option<String>,

    #[serde(default)]
    pub trampoline_path: Option<String>,

    #[serde(default)]
    pub data_bundle_path: Option<String>,

    #[serde(default)]
    pub enable_data_bundle: bool,

    /// Access list of the cluster; `None` means no ACL configured.
    #[serde(default)]
    pub acl: Option<Vec<AclEntry>>,

    /// Human-readable note, never affects the running operation.
    #[serde(default)]
    pub description: Option<String>,

    #[serde(flatten)]
    pub resources: ResourceSpeclet,
}

const fn default_true() -> bool {
    true
}

impl Default for Speclet {
    fn default() -> Self {
        Self {
            active: true,
            pool: None,
            restart_on_speclet_change: true,
            query_engine_path: None,
            log_tailer_path: None,
            trampoline_path: None,
            data_bundle_path: None,
            enable_data_bundle: false,
            acl: None,
            description: None,
            resources: ResourceSpeclet::default(),
        }
    }
}

impl Speclet {
    /// Parse a speclet out of a namespace document.
    pub fn from_document(document: &SpecletDocument) -> DomainResult<Self> {
        serde_json::from_value(document.content.clone())
            .map_err(|e| DomainError::InvalidSpeclet(e.to_string()))
    }

    /// Check the speclet for values the substrate would reject.
    pub fn validate(&self, validate_acl: bool) -> DomainResult<()> {
        if self.resources.instance_count == 0 {
            return Err(DomainError::InvalidSpeclet(
                "instance_count must be at least 1".to_string(),
            ));
        }
        if self.resources.instance_cpu == 0 {
            return Err(DomainError::InvalidSpeclet(
                "instance_cpu must be at least 1".to_string(),
            ));
        }
        if self.resources.instance_memory_bytes == 0 {
            return Err(DomainError::InvalidSpeclet(
                "instance_memory_bytes must be positive".to_string(),
            ));
        }
        if matches!(self.pool.as_deref(), Some("")) {
            return Err(DomainError::InvalidSpeclet(
                "pool cannot be empty".to_string(),
            ));
        }

        let paths = [
            ("query_engine_path", &self.query_engine_path),
            ("log_tailer_path", &self.log_tailer_path),
            ("trampoline_path", &self.trampoline_path),
            ("data_bundle_path", &self.data_bundle_path),
        ];
        for (field, path) in paths {
            if let Some(path) = path {
                if !path.starts_with("//") {
                    return Err(DomainError::InvalidSpeclet(format!(
                        "{field} must be an absolute namespace path, got '{path}'"
                    )));
                }
            }
        }

        if validate_acl {
            for (idx, entry) in self.acl.iter().flatten().enumerate() {
                if entry.subjects.is_empty() {
                    return Err(DomainError::InvalidSpeclet(format!(
                        "acl entry {idx} has no subjects"
                    )));
                }
                if entry.permissions.is_empty() {
                    return Err(DomainError::InvalidSpeclet(format!(
                        "acl entry {idx} has no permissions"
                    )));
                }
            }
        }

        Ok(())
    }
}
