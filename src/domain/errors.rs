//! Domain errors for the clique agent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::domain::ports::errors::{NamespaceError, SubstrateError};

/// Domain-level errors that can occur while reconciling a cluster.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("Substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    #[error("Transient substrate condition: {0}")]
    Transient(String),

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid speclet: {0}")]
    InvalidSpeclet(String),

    #[error("Reconciliation of {cluster} exceeded {timeout_ms}ms")]
    Timeout { cluster: String, timeout_ms: u64 },

    #[error("Reconciliation cancelled")]
    Cancelled,
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error taxonomy used for logging and operator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retried by the next pass without escalation
    Transient,
    /// Unexpected shape of data this agent depends on
    InternalInvariant,
    /// Malformed or rejected speclet; needs operator action
    UserConfig,
    Substrate,
    Namespace,
    Timeout,
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::InternalInvariant => "internal_invariant",
            Self::UserConfig => "user_config",
            Self::Substrate => "substrate",
            Self::Namespace => "namespace",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl DomainError {
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::Namespace(_) => ErrorClass::Namespace,
            Self::Substrate(_) => ErrorClass::Substrate,
            Self::Transient(_) => ErrorClass::Transient,
            Self::InvariantViolation(_) => ErrorClass::InternalInvariant,
            Self::InvalidSpeclet(_) => ErrorClass::UserConfig,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Cancelled => ErrorClass::Cancelled,
        }
    }
}
