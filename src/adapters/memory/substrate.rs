//! In-memory job substrate.
//!
//! Enforces alias uniqueness among unfinished operations and reports
//! failures with the same nested error shapes as the real job API.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::models::{AclEntry, OperationId, OperationSpec, OperationState};
use crate::domain::ports::{JobSubstrate, SubstrateError};

/// Error code the job API uses for unknown operations.
pub const NO_SUCH_OPERATION_CODE: i32 = 1915;

/// Error code of a generic request failure.
pub const GENERIC_ERROR_CODE: i32 = 1;

/// Build the nested error the job API returns when `alias` is held by `holder`.
pub fn alias_conflict_error(alias: &str, holder: &OperationId) -> SubstrateError {
    SubstrateError::new(GENERIC_ERROR_CODE, "Error starting operation").with_inner(
        SubstrateError::new(
            GENERIC_ERROR_CODE,
            format!("Operation alias {alias:?} is already used by an operation"),
        )
        .with_inner(
            SubstrateError::new(GENERIC_ERROR_CODE, "Alias is already taken")
                .with_attribute("alias", json!(alias))
                .with_attribute("operation_id", json!(holder.as_str())),
        ),
    )
}

/// Build the error the job API returns for an unknown operation id.
pub fn no_such_operation_error(operation_id: &OperationId) -> SubstrateError {
    SubstrateError::new(
        NO_SUCH_OPERATION_CODE,
        format!("No such operation {operation_id}"),
    )
}

/// Build the error returned while the scheduler is not ready to accept requests.
pub fn prerequisite_failed_error() -> SubstrateError {
    SubstrateError::new(GENERIC_ERROR_CODE, "Prerequisite check failed")
        .with_inner(SubstrateError::new(GENERIC_ERROR_CODE, "Scheduler is not connected"))
}

#[derive(Debug, Clone)]
struct OperationEntry {
    spec: OperationSpec,
    state: OperationState,
}

#[derive(Debug, Default)]
struct Inner {
    operations: HashMap<OperationId, OperationEntry>,
    start_failures: VecDeque<SubstrateError>,
    state_failures: VecDeque<SubstrateError>,
    start_delays: HashMap<String, Duration>,
}

/// Job substrate backed by process memory, for tests and local simulation.
#[derive(Debug, Default)]
pub struct InMemorySubstrate {
    inner: Mutex<Inner>,
    start_calls: AtomicUsize,
    abort_calls: AtomicUsize,
    acl_updates: AtomicUsize,
}

impl InMemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an operation that exists independently of the agent.
    pub fn seed_operation(&self, spec: OperationSpec, state: OperationState) -> OperationId {
        let id = OperationId::new(Uuid::new_v4().to_string());
        self.lock()
            .operations
            .insert(id.clone(), OperationEntry { spec, state });
        id
    }

    pub fn set_state(&self, operation_id: &OperationId, state: OperationState) -> bool {
        match self.lock().operations.get_mut(operation_id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, operation_id: &OperationId) -> Option<OperationState> {
        self.lock().operations.get(operation_id).map(|e| e.state)
    }

    pub fn spec(&self, operation_id: &OperationId) -> Option<OperationSpec> {
        self.lock()
            .operations
            .get(operation_id)
            .map(|e| e.spec.clone())
    }

    /// Forget an operation entirely, as the job API does once it is archived.
    pub fn forget(&self, operation_id: &OperationId) -> bool {
        self.lock().operations.remove(operation_id).is_some()
    }

    /// Ids of unfinished operations holding `alias`.
    pub fn live_operations_with_alias(&self, alias: &str) -> Vec<OperationId> {
        self.lock()
            .operations
            .iter()
            .filter(|(_, e)| e.spec.alias == alias && !e.state.is_finished())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Fail the next `start_operation` call with `error`.
    pub fn fail_next_start(&self, error: SubstrateError) {
        self.lock().start_failures.push_back(error);
    }

    /// Fail the next `get_operation_state` call with `error`.
    pub fn fail_next_state_query(&self, error: SubstrateError) {
        self.lock().state_failures.push_back(error);
    }

    /// Delay every start of an operation with `alias`.
    pub fn delay_starts(&self, alias: &str, delay: Duration) {
        self.lock().start_delays.insert(alias.to_string(), delay);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn acl_updates(&self) -> usize {
        self.acl_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSubstrate for InMemorySubstrate {
    async fn start_operation(&self, spec: &OperationSpec) -> Result<OperationId, SubstrateError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.lock().start_delays.get(&spec.alias).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        if let Some(error) = inner.start_failures.pop_front() {
            return Err(error);
        }

        let holder = inner
            .operations
            .iter()
            .find(|(_, e)| e.spec.alias == spec.alias && !e.state.is_finished())
            .map(|(id, _)| id.clone());
        if let Some(holder) = holder {
            return Err(alias_conflict_error(&spec.alias, &holder));
        }

        let id = OperationId::new(Uuid::new_v4().to_string());
        inner.operations.insert(
            id.clone(),
            OperationEntry {
                spec: spec.clone(),
                state: OperationState::Initializing,
            },
        );
        Ok(id)
    }

    async fn get_operation_state(
        &self,
        operation_id: &OperationId,
    ) -> Result<OperationState, SubstrateError> {
        let mut inner = self.lock();
        if let Some(error) = inner.state_failures.pop_front() {
            return Err(error);
        }
        inner
            .operations
            .get(operation_id)
            .map(|e| e.state)
            .ok_or_else(|| no_such_operation_error(operation_id))
    }

    async fn abort_operation(
        &self,
        operation_id: &OperationId,
        _message: &str,
    ) -> Result<(), SubstrateError> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        let entry = inner
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| no_such_operation_error(operation_id))?;
        if !entry.state.is_finished() {
            entry.state = OperationState::Aborted;
        }
        Ok(())
    }

    async fn update_operation_acl(
        &self,
        operation_id: &OperationId,
        acl: Option<&[AclEntry]>,
    ) -> Result<(), SubstrateError> {
        self.acl_updates.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        let entry = inner
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| no_such_operation_error(operation_id))?;
        entry.spec.acl = acl.map(<[AclEntry]>::to_vec);
        Ok(())
    }
}
