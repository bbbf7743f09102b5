//! In-memory adapters for the namespace store and the job substrate.

pub mod namespace_store;
pub mod substrate;

pub use namespace_store::InMemoryNamespaceStore;
pub use substrate::InMemorySubstrate;
