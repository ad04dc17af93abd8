//! Conversation state — the single mutable record per conversation.
//!
//! Created on the first message, mutated by the router after every turn and
//! never deleted except by explicit user action. Cross-turn signalling lives
//! in the typed [`SharedMemory`] rather than an open key/value map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::permission::{PendingOperation, PermissionGrants};
use crate::routing::RoutingDecision;

/// Title length derived from the first user message.
const AUTO_TITLE_CHARS: usize = 60;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Handler that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            handler: None,
        }
    }

    pub fn assistant(content: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            handler: Some(handler.into()),
        }
    }
}

/// Typed cross-turn signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedMemory {
    #[serde(default)]
    pub permission_grants: PermissionGrants,

    /// Handler every turn is pinned to until unlocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_agent: Option<String>,

    /// Operations with status `pending`
    #[serde(default)]
    pub pending_operations: Vec<PendingOperation>,

    /// Resolved operations, kept so re-resolution returns the terminal state
    #[serde(default)]
    pub resolved_operations: Vec<PendingOperation>,
}

/// User-facing conversation metadata. Archival is a flag, not deletion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
}

/// Why the last turn did not complete normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorState {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorState {
    pub fn new(kind: ErrorKind, message: impl Into<String>, handler: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            handler,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub user_id: String,

    /// Append-only message history, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub shared_memory: SharedMemory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<String>,

    #[serde(default)]
    pub is_complete: bool,

    #[serde(default)]
    pub requires_user_input: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_state: Option<ErrorState>,

    #[serde(default)]
    pub metadata: ConversationMetadata,

    /// Routing decisions of recent turns, for audit
    #[serde(default)]
    pub routing_log: Vec<RoutingDecision>,

    /// Incremented on every save
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            shared_memory: SharedMemory::default(),
            active_agent: None,
            is_complete: false,
            requires_user_input: false,
            error_state: None,
            metadata: ConversationMetadata::default(),
            routing_log: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message. The first user message seeds the title.
    pub fn push(&mut self, message: Message) {
        if self.metadata.title.is_none() && message.role == Role::User {
            let title: String = message.content.chars().take(AUTO_TITLE_CHARS).collect();
            if !title.trim().is_empty() {
                self.metadata.title = Some(title.trim().to_string());
            }
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn has_history(&self) -> bool {
        !self.messages.is_empty()
    }

    /// The most recent `limit` messages, oldest first.
    pub fn recent_messages(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    pub fn pending_operations(&self) -> impl Iterator<Item = &PendingOperation> {
        self.shared_memory
            .pending_operations
            .iter()
            .filter(|op| op.is_pending())
    }

    pub fn has_pending(&self) -> bool {
        self.pending_operations().next().is_some()
    }

    /// The operation a checkpoint was opened for, pending or resolved.
    pub fn operation_for_checkpoint(&self, checkpoint_id: &str) -> Option<&PendingOperation> {
        self.shared_memory
            .pending_operations
            .iter()
            .chain(self.shared_memory.resolved_operations.iter())
            .find(|op| op.checkpoint_id.as_deref() == Some(checkpoint_id))
    }

    /// Look up an operation among pending and resolved ones.
    pub fn find_operation(&self, operation_id: &str) -> Option<&PendingOperation> {
        self.shared_memory
            .pending_operations
            .iter()
            .chain(self.shared_memory.resolved_operations.iter())
            .find(|op| op.id == operation_id)
    }

    /// Record a routing decision, keeping at most `limit` entries.
    pub fn record_routing(&mut self, decision: RoutingDecision, limit: usize) {
        self.routing_log.push(decision);
        if self.routing_log.len() > limit {
            let excess = self.routing_log.len() - limit;
            self.routing_log.drain(..excess);
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            conversation_id: self.conversation_id.clone(),
            user_id: self.user_id.clone(),
            title: self.metadata.title.clone(),
            tags: self.metadata.tags.clone(),
            pinned: self.metadata.pinned,
            archived: self.metadata.archived,
            message_count: self.messages.len(),
            active_agent: self.active_agent.clone(),
            pending_count: self.pending_operations().count(),
            updated_at: self.updated_at,
        }
    }
}

/// Listing row for a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub archived: bool,
    pub message_count: usize,
    pub active_agent: Option<String>,
    pub pending_count: usize,
    pub updated_at: DateTime<Utc>,
}
