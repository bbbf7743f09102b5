pub mod acl;
pub mod artifact;
pub mod cluster;
pub mod config;
pub mod operation;
pub mod speclet;

pub use acl::{AclEntry, Permission, SecurityAction};
pub use artifact::{Artifact, ArtifactSet};
pub use cluster::{
    ClusterHealth, ClusterNode, ClusterRecord, ClusterStatus, LastError, PersistentState,
};
pub use config::{AgentConfig, ArtifactDefaults, Config, LoggingConfig, TeardownPolicy};
pub use operation::{OperationId, OperationSpec, OperationState};
pub use speclet::{ResourceSpeclet, Revision, Speclet, SpecletDocument};
