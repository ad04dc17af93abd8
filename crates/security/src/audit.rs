//! Audit trail — structured records of routing and permission decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use switchyard_core::{Capability, RoutingReason};

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub event: AuditEvent,
    /// Who caused the event: a handler name or `user`
    pub actor: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Auditable decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A turn was routed
    Routed { handler: String, reason: RoutingReason },
    /// A pending operation was opened for a missing capability
    PermissionRequested {
        operation_id: String,
        capability: Capability,
    },
    /// The user approved an operation; the capability was granted
    PermissionApproved {
        operation_id: String,
        capability: Capability,
    },
    /// The user denied an operation
    PermissionDenied {
        operation_id: String,
        capability: Capability,
    },
    /// A suspended handler was re-entered
    CheckpointResumed { checkpoint_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
    /// A repeated resolution that changed nothing
    NoOp,
}

/// Where audit entries are forwarded besides the in-memory trail.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// In-memory audit trail with optional forwarding sinks.
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
    capacity: usize,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// Keeps the most recent 10k entries in memory.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
            capacity: 10_000,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEntry>> {
        // A poisoned trail is still readable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn log(
        &self,
        conversation_id: &str,
        event: AuditEvent,
        actor: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            conversation_id: conversation_id.into(),
            event,
            actor: actor.into(),
            outcome,
            details,
        };

        {
            let mut entries = self.lock();
            entries.push(entry.clone());
            if entries.len() > self.capacity {
                let excess = entries.len() - self.capacity;
                entries.drain(..excess);
            }
        }

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Entries for one conversation, oldest first.
    pub fn for_conversation(&self, conversation_id: &str) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Number of approvals that actually granted `capability` in a conversation.
    pub fn grants_recorded(&self, conversation_id: &str, capability: Capability) -> usize {
        self.lock()
            .iter()
            .filter(|e| {
                e.conversation_id == conversation_id
                    && e.outcome == AuditOutcome::Success
                    && matches!(&e.event, AuditEvent::PermissionApproved { capability: c, .. } if *c == capability)
            })
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// Forwards entries to `tracing` at info level.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            conversation_id = %entry.conversation_id,
            event = ?entry.event,
            actor = %entry.actor,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}
