//! Adapters for external systems.

pub mod memory;
