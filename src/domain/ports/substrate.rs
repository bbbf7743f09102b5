//! Substrate port - interface to the job execution API that runs cluster operations.

use async_trait::async_trait;

use super::errors::SubstrateError;
use crate::domain::models::{AclEntry, OperationId, OperationSpec, OperationState};

/// Job execution API of the compute substrate.
///
/// Implementations report failures as structured [`SubstrateError`]s; the
/// agent classifies them, so adapters should not rewrite messages.
#[async_trait]
pub trait JobSubstrate: Send + Sync {
    /// Start a new operation. Fails if a live operation already holds `spec.alias`.
    async fn start_operation(&self, spec: &OperationSpec) -> Result<OperationId, SubstrateError>;

    /// Get the current lifecycle state of an operation.
    async fn get_operation_state(
        &self,
        operation_id: &OperationId,
    ) -> Result<OperationState, SubstrateError>;

    /// Request an operation to abort.
    async fn abort_operation(
        &self,
        operation_id: &OperationId,
        message: &str,
    ) -> Result<(), SubstrateError>;

    /// Replace the ACL of a running operation in place.
    async fn update_operation_acl(
        &self,
        operation_id: &OperationId,
        acl: Option<&[AclEntry]>,
    ) -> Result<(), SubstrateError>;
}
