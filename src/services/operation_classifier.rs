//! Operation state and substrate error classification.
//!
//! Two concerns live here:
//! - deciding whether an operation's lifecycle state calls for a restart;
//! - classifying substrate errors into the few conditions the controller
//!   reacts to, and recovering the holder of a conflicting alias.
//!
//! The job API reports these conditions only through message text, so the
//! built-in rules are case-insensitive regexes. Rules are an ordered table
//! of predicates; a structured-code rule can be put in front of them
//! without changing any caller.

use std::fmt;

use regex::RegexBuilder;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{OperationId, OperationState};
use crate::domain::ports::SubstrateError;

/// States after which the operation will not serve queries again.
pub const RESTART_STATES: [OperationState; 6] = [
    OperationState::Aborted,
    OperationState::Aborting,
    OperationState::Completed,
    OperationState::Completing,
    OperationState::Failed,
    OperationState::Failing,
];

/// Attribute of the innermost alias-conflict error naming the holder.
pub const OPERATION_ID_ATTRIBUTE: &str = "operation_id";

/// Whether an operation in `state` must be replaced.
pub fn needs_restart(state: OperationState) -> bool {
    RESTART_STATES.contains(&state)
}

/// Conditions the controller distinguishes among substrate errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstrateErrorKind {
    /// The operation does not exist; safe to start a fresh one
    NoSuchOperation,
    /// Another live operation already holds the alias
    AliasConflict,
    /// Scheduler not ready; retry on the next pass
    PrerequisiteFailed,
    Unknown,
}

type Predicate = Box<dyn Fn(&SubstrateError) -> bool + Send + Sync>;

/// One entry of the classification table.
pub struct ClassifierRule {
    kind: SubstrateErrorKind,
    description: String,
    predicate: Predicate,
}

impl ClassifierRule {
    pub fn new<F>(kind: SubstrateErrorKind, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SubstrateError) -> bool + Send + Sync + 'static,
    {
        Self {
            kind,
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Match when any message in the error tree matches `pattern`, ignoring case.
    pub fn message_pattern(kind: SubstrateErrorKind, pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self::new(kind, format!("message ~ /{pattern}/i"), move |err| {
            err.messages().into_iter().any(|m| regex.is_match(m))
        }))
    }

    /// Match when the error tree carries `code`.
    pub fn error_code(kind: SubstrateErrorKind, code: i32) -> Self {
        Self::new(kind, format!("code == {code}"), move |err| {
            err.contains_code(code)
        })
    }

    pub fn kind(&self) -> SubstrateErrorKind {
        self.kind
    }

    pub fn matches(&self, err: &SubstrateError) -> bool {
        (self.predicate)(err)
    }
}

impl fmt::Debug for ClassifierRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierRule")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .finish()
    }
}

/// Ordered table of classification rules; the first match wins.
#[derive(Debug, Default)]
pub struct ErrorClassifier {
    rules: Vec<ClassifierRule>,
}

impl ErrorClassifier {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Classifier with the message-based rules for the known job API errors.
    pub fn builtin() -> Result<Self, regex::Error> {
        Ok(Self::empty()
            .with_rule(ClassifierRule::message_pattern(
                SubstrateErrorKind::NoSuchOperation,
                r"no such operation",
            )?)
            .with_rule(ClassifierRule::message_pattern(
                SubstrateErrorKind::AliasConflict,
                r"alias\b.*\balready used by an operation",
            )?)
            .with_rule(ClassifierRule::message_pattern(
                SubstrateErrorKind::PrerequisiteFailed,
                r"prerequisite check failed",
            )?))
    }

    /// Append a rule, consulted after every existing one.
    pub fn with_rule(mut self, rule: ClassifierRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule ahead of every existing one.
    pub fn with_priority_rule(mut self, rule: ClassifierRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn classify(&self, err: &SubstrateError) -> SubstrateErrorKind {
        self.rules
            .iter()
            .find(|rule| rule.matches(err))
            .map_or(SubstrateErrorKind::Unknown, ClassifierRule::kind)
    }

    pub fn is(&self, err: &SubstrateError, kind: SubstrateErrorKind) -> bool {
        self.classify(err) == kind
    }
}

/// Extract the id of the operation holding the alias from a conflict error.
///
/// The job API wraps the conflict in exactly two layers; the innermost
/// error carries the holder's id as a string attribute. Any other shape
/// is an invariant violation.
pub fn conflicting_operation_id(err: &SubstrateError) -> DomainResult<OperationId> {
    let innermost = err
        .inner_errors
        .first()
        .and_then(|middle| middle.inner_errors.first())
        .ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "alias conflict error is not nested two levels deep: {err}"
            ))
        })?;

    match innermost.attributes.get(OPERATION_ID_ATTRIBUTE) {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(OperationId::new(id.clone())),
        Some(other) => Err(DomainError::InvariantViolation(format!(
            "alias conflict error has malformed {OPERATION_ID_ATTRIBUTE} attribute: {other}"
        ))),
        None => Err(DomainError::InvariantViolation(format!(
            "alias conflict error has no {OPERATION_ID_ATTRIBUTE} attribute: {err}"
        ))),
    }
}
