//! clique-agent - reconciliation agent for query-engine clusters
//!
//! The agent watches a namespace directory in which every child node
//! describes one cluster through its speclet, and keeps exactly one
//! long-running job-system operation per active cluster in line with it:
//! starting missing operations, replacing failed ones, restarting on
//! relevant speclet changes, and adopting operations that already hold a
//! cluster's alias.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits for the
//!   namespace store and the job substrate
//! - **Service Layer** (`services`): diffing, classification, single-cluster
//!   reconciliation and the sharded pass loop
//! - **Adapters** (`adapters`): in-memory port implementations
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use clique_agent::adapters::memory::{InMemoryNamespaceStore, InMemorySubstrate};
//! use clique_agent::services::Agent;
//! use clique_agent::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> clique_agent::domain::DomainResult<()> {
//! let store = Arc::new(InMemoryNamespaceStore::new());
//! let substrate = Arc::new(InMemorySubstrate::new());
//! let agent = Agent::new(store, substrate, &Config::default())?;
//! let report = agent.run_pass(&CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AclEntry, ClusterHealth, ClusterNode, ClusterRecord, ClusterStatus, Config, OperationId,
    OperationSpec, OperationState, PersistentState, Revision, Speclet, TeardownPolicy,
};
pub use domain::ports::{JobSubstrate, NamespaceError, NamespaceStore, SubstrateError};
pub use domain::{DomainError, DomainResult, ErrorClass};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Agent, AgentDaemon, ClusterController, PassReport, ReconcileOutcome};
