//! Permission gate — the pending → approved | denied state machine.
//!
//! All transitions are pure functions over a [`ConversationState`]; the
//! router supplies load, serialization and persistence around them.

use chrono::Utc;
use switchyard_core::error::{PermissionError, StoreError};
use switchyard_core::{
    Capability, ConversationState, Error, OperationStatus, PendingOperation, ResumeSignal,
};

/// Result of resolving an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub operation: PendingOperation,
    /// False when the operation was already resolved and nothing changed
    pub changed: bool,
}

pub struct PermissionGate;

impl PermissionGate {
    /// Capabilities from `required` the conversation has not been granted.
    pub fn missing(state: &ConversationState, required: &[Capability]) -> Vec<Capability> {
        state.shared_memory.permission_grants.missing(required)
    }

    /// Open `operation`, or refresh the still-pending one for the same
    /// handler and capability. Returns the stored operation and whether it
    /// was newly created.
    pub fn request(
        state: &mut ConversationState,
        operation: PendingOperation,
    ) -> (PendingOperation, bool) {
        let existing = state.shared_memory.pending_operations.iter_mut().find(|op| {
            op.is_pending()
                && op.handler == operation.handler
                && op.capability_required == operation.capability_required
        });
        if let Some(op) = existing {
            op.summary = operation.summary;
            op.kind = operation.kind;
            if operation.checkpoint_id.is_some() {
                op.checkpoint_id = operation.checkpoint_id;
            }
            return (op.clone(), false);
        }
        state
            .shared_memory
            .pending_operations
            .push(operation.clone());
        (operation, true)
    }

    /// Approve and grant the capability. Idempotent.
    pub fn approve(
        state: &mut ConversationState,
        operation_id: &str,
    ) -> Result<Resolution, PermissionError> {
        Self::resolve(state, operation_id, OperationStatus::Approved)
    }

    /// Deny without granting. Idempotent.
    pub fn deny(
        state: &mut ConversationState,
        operation_id: &str,
    ) -> Result<Resolution, PermissionError> {
        Self::resolve(state, operation_id, OperationStatus::Denied)
    }

    /// Operations still awaiting a decision, oldest first.
    pub fn pending(state: &ConversationState) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = state.pending_operations().cloned().collect();
        ops.sort_by_key(|op| op.created_at);
        ops
    }

    /// The only signal `checkpoint_id` may be resumed with, derived from
    /// the decision recorded on the operation that owns it.
    ///
    /// Fails while the operation is still pending, when it was already
    /// resumed, and for an approval whose capability is not granted.
    pub fn resume_signal(
        state: &ConversationState,
        checkpoint_id: &str,
    ) -> Result<ResumeSignal, Error> {
        let operation = state.operation_for_checkpoint(checkpoint_id).ok_or_else(|| {
            Error::InvalidArgument(format!("no operation is waiting on checkpoint {checkpoint_id}"))
        })?;
        if operation.resumed_at.is_some() {
            return Err(StoreError::CheckpointConsumed {
                checkpoint_id: checkpoint_id.to_string(),
            }
            .into());
        }

        let capability = operation.capability_required;
        match operation.status {
            OperationStatus::Pending => Err(Error::InvalidArgument(format!(
                "operation {} is still pending",
                operation.id
            ))),
            OperationStatus::Denied => Ok(ResumeSignal::Denied(capability)),
            OperationStatus::Approved if Self::missing(state, &[capability]).is_empty() => {
                Ok(ResumeSignal::Approved(capability))
            }
            OperationStatus::Approved => Err(PermissionError::Required {
                handler: operation.handler.clone(),
                capability: capability.to_string(),
            }
            .into()),
        }
    }

    /// Record that the handler behind `checkpoint_id` was re-entered.
    pub fn mark_resumed(state: &mut ConversationState, checkpoint_id: &str) {
        if let Some(op) = state
            .shared_memory
            .resolved_operations
            .iter_mut()
            .find(|op| op.checkpoint_id.as_deref() == Some(checkpoint_id))
        {
            op.resumed_at = Some(Utc::now());
        }
    }

    fn resolve(
        state: &mut ConversationState,
        operation_id: &str,
        status: OperationStatus,
    ) -> Result<Resolution, PermissionError> {
        let memory = &mut state.shared_memory;
        let position = memory
            .pending_operations
            .iter()
            .position(|op| op.id == operation_id && op.is_pending());

        let Some(index) = position else {
            // Already resolved: report the existing terminal state.
            return state
                .find_operation(operation_id)
                .map(|op| Resolution {
                    operation: op.clone(),
                    changed: false,
                })
                .ok_or_else(|| PermissionError::NotFound {
                    conversation_id: state.conversation_id.clone(),
                    operation_id: operation_id.to_string(),
                });
        };

        let mut operation = memory.pending_operations.remove(index);
        operation.status = status;
        operation.resolved_at = Some(Utc::now());
        if status == OperationStatus::Approved {
            memory
                .permission_grants
                .grant(operation.capability_required);
        }
        memory.resolved_operations.push(operation.clone());

        Ok(Resolution {
            operation,
            changed: true,
        })
    }
}
