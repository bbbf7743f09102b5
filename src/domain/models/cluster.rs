//! Cluster records: the agent's in-memory view of each managed cluster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::{OperationId, OperationState};
use super::speclet::{Revision, Speclet};
use crate::domain::errors::{DomainError, ErrorClass};

/// One cluster node as returned by the batched revision listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub alias: String,
    pub path: String,
    pub revision: Revision,
}

/// State the agent writes back to the cluster node so that it survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub operation_id: Option<OperationId>,
    #[serde(default)]
    pub operation_state: Option<OperationState>,
    #[serde(default)]
    pub incarnation_index: u64,
    /// Revision of the speclet the tracked operation was launched from.
    #[serde(default)]
    pub speclet_revision: Option<Revision>,
}

/// Operator-facing health summary of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterHealth {
    /// Observed but not reconciled yet
    Pending,
    /// Tracking a live operation
    Running,
    /// Speclet marks the cluster inactive
    Inactive,
    /// Last attempt hit a transient problem; the next pass retries
    TransientFailure,
    /// Speclet is malformed or rejected; needs operator action
    InvalidSpeclet,
    /// Last attempt failed for any other reason
    Failed,
}

impl ClusterHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Inactive => "inactive",
            Self::TransientFailure => "transient_failure",
            Self::InvalidSpeclet => "invalid_speclet",
            Self::Failed => "failed",
        }
    }
}

/// Last reconciliation error recorded on a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub class: ErrorClass,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Controller-owned tracking record for one cluster.
#[derive(Debug, Clone)]
pub struct ClusterRecord {
    pub alias: String,
    pub path: String,
    /// Revision of the node when its speclet was last fetched.
    pub revision: Option<Revision>,
    /// Desired speclet as of `revision`.
    pub speclet: Option<Speclet>,
    /// Speclet the tracked operation was launched from.
    pub applied_speclet: Option<Speclet>,
    pub applied_revision: Option<Revision>,
    pub operation_id: Option<OperationId>,
    pub operation_state: Option<OperationState>,
    pub incarnation: u64,
    pub last_error: Option<LastError>,
    pub last_restart: Option<DateTime<Utc>>,
    pub last_reconciled: Option<DateTime<Utc>>,
    pub health: ClusterHealth,
    /// Whether state persisted on the node has been read for this record.
    pub persisted_state_read: bool,
}

impl ClusterRecord {
    pub fn new(alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: path.into(),
            revision: None,
            speclet: None,
            applied_speclet: None,
            applied_revision: None,
            operation_id: None,
            operation_state: None,
            incarnation: 0,
            last_error: None,
            last_restart: None,
            last_reconciled: None,
            health: ClusterHealth::Pending,
            persisted_state_read: false,
        }
    }

    pub fn from_node(node: &ClusterNode) -> Self {
        Self::new(node.alias.clone(), node.path.clone())
    }

    /// Resume tracking from state persisted by a previous agent incarnation.
    pub fn restore(&mut self, state: PersistentState) {
        self.operation_id = state.operation_id;
        self.operation_state = state.operation_state;
        self.incarnation = state.incarnation_index;
        self.applied_revision = state.speclet_revision;
        self.applied_speclet = None;
    }

    pub fn persistent_state(&self) -> PersistentState {
        PersistentState {
            operation_id: self.operation_id.clone(),
            operation_state: self.operation_state,
            incarnation_index: self.incarnation,
            speclet_revision: self.applied_revision,
        }
    }

    /// Whether the speclet must be re-read for a node now at `revision`.
    pub fn needs_speclet_fetch(&self, revision: Revision) -> bool {
        match self.revision {
            Some(seen) => revision > seen || self.speclet.is_none(),
            None => true,
        }
    }

    pub fn set_desired(&mut self, speclet: Speclet, revision: Revision) {
        self.speclet = Some(speclet);
        self.revision = Some(revision);
    }

    /// Start tracking `operation_id` as launched from the current desired speclet.
    pub fn track_operation(&mut self, operation_id: OperationId) {
        self.operation_id = Some(operation_id);
        self.operation_state = None;
        self.applied_speclet = self.speclet.clone();
        self.applied_revision = self.revision;
        self.incarnation += 1;
        self.last_restart = Some(Utc::now());
        self.health = ClusterHealth::Running;
    }

    pub fn clear_operation(&mut self) {
        self.operation_id = None;
        self.operation_state = None;
    }

    pub fn record_error(&mut self, error: &DomainError) {
        let class = error.error_class();
        self.health = match class {
            ErrorClass::UserConfig => ClusterHealth::InvalidSpeclet,
            ErrorClass::Transient | ErrorClass::Timeout | ErrorClass::Cancelled => {
                ClusterHealth::TransientFailure
            }
            _ => ClusterHealth::Failed,
        };
        self.last_error = Some(LastError {
            class,
            message: error.to_string(),
            at: Utc::now(),
        });
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn status(&self) -> ClusterStatus {
        ClusterStatus {
            alias: self.alias.clone(),
            path: self.path.clone(),
            health: self.health,
            revision: self.revision,
            operation_id: self.operation_id.clone(),
            operation_state: self.operation_state,
            incarnation: self.incarnation,
            last_error: self.last_error.clone(),
            last_restart: self.last_restart,
            last_reconciled: self.last_reconciled,
        }
    }
}

/// Read-only snapshot of a cluster record for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub alias: String,
    pub path: String,
    pub health: ClusterHealth,
    pub revision: Option<Revision>,
    pub operation_id: Option<OperationId>,
    pub operation_state: Option<OperationState>,
    pub incarnation: u64,
    pub last_error: Option<LastError>,
    pub last_restart: Option<DateTime<Utc>>,
    pub last_reconciled: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_speclet_fetch() {
        let mut record = ClusterRecord::new("alpha", "//sys/clique/clusters/alpha");
        assert!(record.needs_speclet_fetch(Revision(1)));

        record.set_desired(Speclet::default(), Revision(5));
        assert!(!record.needs_speclet_fetch(Revision(5)));
        assert!(!record.needs_speclet_fetch(Revision(4)));
        assert!(record.needs_speclet_fetch(Revision(6)));
    }

    #[test]
    fn test_track_operation_sets_baseline() {
        let mut record = ClusterRecord::new("alpha", "//sys/clique/clusters/alpha");
        record.set_desired(Speclet::default(), Revision(2));
        record.track_operation(OperationId::new("op-1"));

        assert_eq!(record.incarnation, 1);
        assert_eq!(record.applied_revision, Some(Revision(2)));
        assert_eq!(record.applied_speclet, Some(Speclet::default()));
        assert_eq!(record.health, ClusterHealth::Running);
        assert!(record.last_restart.is_some());
    }

    #[test]
    fn test_persistent_state_round_trip() {
        let mut record = ClusterRecord::new("alpha", "//sys/clique/clusters/alpha");
        record.set_desired(Speclet::default(), Revision(7));
        record.track_operation(OperationId::new("op-9"));
        record.operation_state = Some(OperationState::Running);

        let state = record.persistent_state();
        let mut restored = ClusterRecord::new("alpha", "//sys/clique/clusters/alpha");
        restored.restore(state);

        assert_eq!(restored.operation_id, Some(OperationId::new("op-9")));
        assert_eq!(restored.operation_state, Some(OperationState::Running));
        assert_eq!(restored.incarnation, 1);
        assert_eq!(restored.applied_revision, Some(Revision(7)));
        assert!(restored.applied_speclet.is_none());
    }

    #[test]
    fn test_record_error_maps_health() {
        let mut record = ClusterRecord::new("alpha", "//sys/clique/clusters/alpha");

        record.record_error(&DomainError::InvalidSpeclet("bad".to_string()));
        assert_eq!(record.health, ClusterHealth::InvalidSpeclet);

        record.record_error(&DomainError::Transient("prerequisite".to_string()));
        assert_eq!(record.health, ClusterHealth::TransientFailure);

        record.record_error(&DomainError::InvariantViolation("shape".to_string()));
        assert_eq!(record.health, ClusterHealth::Failed);
        assert_eq!(
            record.last_error.as_ref().map(|e| e.class),
            Some(ErrorClass::InternalInvariant)
        );
    }
}
