//! Operation domain model.
//!
//! An operation is the long-running job on the compute substrate that
//! hosts one cluster. The agent only holds its identifier and the last
//! observed lifecycle state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::acl::AclEntry;
use super::artifact::Artifact;

/// Substrate-assigned operation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state reported by the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Initializing,
    Preparing,
    Materializing,
    Pending,
    Running,
    Completing,
    Completed,
    Aborting,
    Aborted,
    Failing,
    Failed,
    Reviving,
}

impl OperationState {
    pub const ALL: [Self; 12] = [
        Self::Initializing,
        Self::Preparing,
        Self::Materializing,
        Self::Pending,
        Self::Running,
        Self::Completing,
        Self::Completed,
        Self::Aborting,
        Self::Aborted,
        Self::Failing,
        Self::Failed,
        Self::Reviving,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Preparing => "preparing",
            Self::Materializing => "materializing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborting => "aborting",
            Self::Aborted => "aborted",
            Self::Failing => "failing",
            Self::Failed => "failed",
            Self::Reviving => "reviving",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == s)
    }

    /// The operation has fully stopped; aborting it again is pointless.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full description of an operation to start on the substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Deterministic alias; the substrate refuses a second live operation with it.
    pub alias: String,
    pub title: String,
    pub pool: Option<String>,
    /// User the operation is started on behalf of.
    pub started_by: String,
    pub acl: Option<Vec<AclEntry>>,
    /// Files delivered into every job sandbox.
    pub file_paths: Vec<Artifact>,
    pub command: String,
    pub instance_count: u32,
    pub instance_cpu: u32,
    pub instance_memory_bytes: u64,
    /// Free-form attributes shown in the substrate UI.
    pub description: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_str() {
        for state in OperationState::ALL {
            assert_eq!(OperationState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(OperationState::from_str("exploded"), None);
    }

    #[test]
    fn test_finished_states() {
        let finished: Vec<_> = OperationState::ALL
            .into_iter()
            .filter(OperationState::is_finished)
            .collect();
        assert_eq!(
            finished,
            vec![
                OperationState::Completed,
                OperationState::Aborted,
                OperationState::Failed
            ]
        );
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&OperationState::Materializing).unwrap();
        assert_eq!(json, "\"materializing\"");
    }
}
