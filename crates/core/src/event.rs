//! Domain event system — decoupled observation of turns and approvals.
//!
//! Events are published when something interesting happens in the router.
//! Other components (the gateway's event feed, audit sinks) subscribe
//! without coupling to the router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::permission::{Capability, OperationStatus};
use crate::routing::RoutingReason;
use crate::stream::TaskStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A turn was routed to a handler
    TurnStarted {
        conversation_id: String,
        handler: String,
        reason: RoutingReason,
        timestamp: DateTime<Utc>,
    },

    /// A turn reached a terminal outcome and was persisted
    TurnCompleted {
        conversation_id: String,
        handler: String,
        task_status: TaskStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A handler needs a capability that has not been granted
    PermissionRequested {
        conversation_id: String,
        operation_id: String,
        capability: Capability,
        handler: String,
        timestamp: DateTime<Utc>,
    },

    /// An operation was approved or denied
    PermissionResolved {
        conversation_id: String,
        operation_id: String,
        status: OperationStatus,
        timestamp: DateTime<Utc>,
    },

    /// A suspended invocation was re-entered from its checkpoint
    CheckpointResumed {
        conversation_id: String,
        checkpoint_id: String,
        handler: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn ended in an error state
    HandlerFailed {
        conversation_id: String,
        handler: Option<String>,
        kind: ErrorKind,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::PermissionRequested { .. } => "permission_requested",
            Self::PermissionResolved { .. } => "permission_resolved",
            Self::CheckpointResumed { .. } => "checkpoint_resumed",
            Self::HandlerFailed { .. } => "handler_failed",
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::TurnStarted { conversation_id, .. }
            | Self::TurnCompleted { conversation_id, .. }
            | Self::PermissionRequested { conversation_id, .. }
            | Self::PermissionResolved { conversation_id, .. }
            | Self::CheckpointResumed { conversation_id, .. }
            | Self::HandlerFailed { conversation_id, .. } => conversation_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
