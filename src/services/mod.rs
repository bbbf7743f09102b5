//! Reconciliation services.

pub mod acl_translator;
pub mod agent;
pub mod agent_daemon;
pub mod artifact_resolver;
pub mod cluster_controller;
pub mod operation_classifier;
pub mod speclet_differ;

pub use acl_translator::translate_acl;
pub use agent::{Agent, PassReport};
pub use agent_daemon::{AgentDaemon, AgentDaemonConfig, AgentEvent, DaemonHandle, StopReason};
pub use artifact_resolver::ArtifactResolver;
pub use cluster_controller::{
    ClusterController, ControllerConfig, Launch, ReconcileOutcome, RestartReason,
};
pub use operation_classifier::{ErrorClassifier, SubstrateErrorKind};
pub use speclet_differ::{diff_speclets, SpecletDiff, SpecletShape};
