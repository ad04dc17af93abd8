//! Conversation store traits — the durable leaf dependency of the router.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{Envelope, PersonaSettings};
use crate::conversation::{ConversationState, ConversationSummary};
use crate::error::StoreError;

/// Durable snapshot of a suspended handler invocation.
///
/// Keyed by `(conversation_id, checkpoint_id)`. Consumed exactly once on
/// resume; consumed checkpoints are kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub conversation_id: String,
    pub checkpoint_id: String,
    pub handler: String,

    /// Conversation version at suspension time
    pub state_version: u64,

    /// Handler-private progress, opaque to the router
    #[serde(default)]
    pub progress: serde_json::Value,

    /// Envelope the handler was (or would have been) invoked with
    pub envelope: Envelope,

    /// Caller deadline of the suspended turn, reused on resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(
        conversation_id: impl Into<String>,
        handler: impl Into<String>,
        state_version: u64,
        progress: serde_json::Value,
        envelope: Envelope,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            checkpoint_id: Uuid::new_v4().to_string(),
            handler: handler.into(),
            state_version,
            progress,
            envelope,
            deadline_ms: None,
            created_at: Utc::now(),
            consumed_at: None,
        }
    }

    pub fn with_deadline(mut self, deadline_ms: Option<u64>) -> Self {
        self.deadline_ms = deadline_ms;
        self
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// Durable keyed storage for conversation state and checkpoints.
///
/// `save` must be atomic: a reader observes either the previous or the new
/// state, never a mix.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g. "sqlite", "memory").
    fn name(&self) -> &str;

    async fn load(
        &self,
        conversation_id: &str,
    ) -> std::result::Result<Option<ConversationState>, StoreError>;

    async fn save(&self, state: &ConversationState) -> std::result::Result<(), StoreError>;

    /// Insert or replace a checkpoint.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> std::result::Result<(), StoreError>;

    async fn load_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint_id: &str,
    ) -> std::result::Result<Option<Checkpoint>, StoreError>;

    /// Conversations owned by a user, most recently updated first.
    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> std::result::Result<Vec<ConversationSummary>, StoreError>;

    /// Delete a conversation and its checkpoints. Returns whether it existed.
    async fn delete_conversation(&self, conversation_id: &str)
    -> std::result::Result<bool, StoreError>;

    async fn health_check(&self) -> std::result::Result<(), StoreError>;
}

/// Read access to per-user persona records.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn load_persona(
        &self,
        user_id: &str,
    ) -> std::result::Result<Option<PersonaSettings>, StoreError>;

    async fn save_persona(&self, persona: &PersonaSettings) -> std::result::Result<(), StoreError>;
}
