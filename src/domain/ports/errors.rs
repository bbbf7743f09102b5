use std::collections::BTreeMap;

use thiserror::Error;

/// Namespace store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Malformed node {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Namespace request failed: {0}")]
    Transport(String),
}

/// Structured error returned by the substrate job API.
///
/// Errors nest: the substrate wraps the root cause in up to two layers of
/// context, and the innermost layer carries machine-readable attributes.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} (code {code})")]
pub struct SubstrateError {
    pub code: i32,
    pub message: String,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub inner_errors: Vec<SubstrateError>,
}

impl SubstrateError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            attributes: BTreeMap::new(),
            inner_errors: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_inner(mut self, inner: SubstrateError) -> Self {
        self.inner_errors.push(inner);
        self
    }

    /// Messages of this error and every nested error, depth first.
    pub fn messages(&self) -> Vec<&str> {
        let mut out = vec![self.message.as_str()];
        for inner in &self.inner_errors {
            out.extend(inner.messages());
        }
        out
    }

    /// Whether this error or any nested error carries `code`.
    pub fn contains_code(&self, code: i32) -> bool {
        self.code == code || self.inner_errors.iter().any(|e| e.contains_code(code))
    }
}
