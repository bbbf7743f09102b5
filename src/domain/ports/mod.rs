//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - NamespaceStore: speclet, revision and persisted state access
//! - JobSubstrate: starting, inspecting and aborting cluster operations
//!
//! These traits define the contracts that allow the domain to be independent
//! of specific wire-level clients.

pub mod errors;
pub mod namespace_store;
pub mod substrate;

pub use errors::{NamespaceError, SubstrateError};
pub use namespace_store::{NamespaceStore, NodeType};
pub use substrate::JobSubstrate;
