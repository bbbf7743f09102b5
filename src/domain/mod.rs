//! Domain layer for the clique agent
//!
//! This module contains the cluster, speclet and operation models, the
//! error taxonomy, and the ports to the namespace store and the substrate.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, ErrorClass};
