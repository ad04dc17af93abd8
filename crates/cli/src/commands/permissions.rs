//! `switchyard permissions` — List, approve or deny pending operations.

use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use switchyard_core::error::StoreError;
use switchyard_core::{Error, OperationStatus, PendingOperation, ResumeSignal};
use switchyard_router::{Router, TurnOutcome};

#[derive(Subcommand)]
pub enum PermissionsAction {
    /// Show pending operations for a conversation
    List { conversation: String },
    /// Approve an operation and resume its handler
    Approve { conversation: String, operation: String },
    /// Deny an operation and resume its handler with the refusal
    Deny { conversation: String, operation: String },
}

pub async fn run(
    config_path: Option<&Path>,
    action: PermissionsAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = super::local_router(config_path).await?;

    match action {
        PermissionsAction::List { conversation } => {
            let pending = router.get_pending(&conversation).await?;
            if pending.is_empty() {
                println!("  No pending operations for {conversation}");
            } else {
                println!("  {} pending operation(s):\n", pending.len());
                for op in &pending {
                    super::print_operation(op);
                    println!();
                }
            }
        }
        PermissionsAction::Approve {
            conversation,
            operation,
        } => {
            let (op, outcome) =
                resolve_and_resume(&router, &conversation, &operation, true).await?;
            println!("  ✅ Approved: {}", op.summary);
            print_outcome(outcome.as_ref());
        }
        PermissionsAction::Deny {
            conversation,
            operation,
        } => {
            let (op, outcome) =
                resolve_and_resume(&router, &conversation, &operation, false).await?;
            println!("  ❌ Denied: {}", op.summary);
            print_outcome(outcome.as_ref());
        }
    }

    Ok(())
}

/// Resolve an operation, then resume its checkpoint in the foreground.
///
/// Returns no outcome when the operation has no checkpoint or its
/// checkpoint was already resumed by an earlier resolution.
pub async fn resolve_and_resume(
    router: &Arc<Router>,
    conversation_id: &str,
    operation_id: &str,
    approve: bool,
) -> Result<(PendingOperation, Option<TurnOutcome>), Error> {
    let op = if approve {
        router.approve(conversation_id, operation_id).await?
    } else {
        router.deny(conversation_id, operation_id).await?
    };

    let Some(checkpoint_id) = op.checkpoint_id.as_deref() else {
        return Ok((op, None));
    };
    let signal = match op.status {
        OperationStatus::Approved => ResumeSignal::Approved(op.capability_required),
        _ => ResumeSignal::Denied(op.capability_required),
    };

    match router.resume(conversation_id, checkpoint_id, signal).await {
        Ok(outcome) => Ok((op, Some(outcome))),
        Err(Error::Store(StoreError::CheckpointConsumed { .. })) => Ok((op, None)),
        Err(e) => Err(e),
    }
}

pub fn print_outcome(outcome: Option<&TurnOutcome>) {
    let Some(outcome) = outcome else {
        println!("  (already resumed)");
        return;
    };

    let handler = outcome.handler.as_deref().unwrap_or("assistant");
    println!();
    for line in outcome.content.lines() {
        println!("  {handler} > {line}");
    }
    if let Some(op) = &outcome.pending_operation {
        println!();
        println!("  Another approval is needed:");
        super::print_operation(op);
    }
    if let Some(error) = &outcome.error {
        eprintln!("  [{}] {}", error.kind, error.message);
    }
}
