//! In-memory backend — useful for testing and ephemeral deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::error::StoreError;
use switchyard_core::{
    Checkpoint, ConversationState, ConversationStore, ConversationSummary, PersonaSettings,
    PersonaStore,
};
use tokio::sync::RwLock;

/// Stores conversations, checkpoints and personas in process memory.
///
/// `save` replaces the whole state under a write lock, so readers see either
/// the previous or the new state.
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<String, ConversationState>>>,
    checkpoints: Arc<RwLock<HashMap<(String, String), Checkpoint>>>,
    personas: Arc<RwLock<HashMap<String, PersonaSettings>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            checkpoints: Arc::new(RwLock::new(HashMap::new())),
            personas: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.conversations.read().await.get(conversation_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.conversations
            .write()
            .await
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let key = (
            checkpoint.conversation_id.clone(),
            checkpoint.checkpoint_id.clone(),
        );
        self.checkpoints.write().await.insert(key, checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let key = (conversation_id.to_string(), checkpoint_id.to_string());
        Ok(self.checkpoints.read().await.get(&key).cloned())
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.summary())
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let existed = self
            .conversations
            .write()
            .await
            .remove(conversation_id)
            .is_some();
        self.checkpoints
            .write()
            .await
            .retain(|(conv, _), _| conv != conversation_id);
        Ok(existed)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl PersonaStore for InMemoryStore {
    async fn load_persona(&self, user_id: &str) -> Result<Option<PersonaSettings>, StoreError> {
        Ok(self.personas.read().await.get(user_id).cloned())
    }

    async fn save_persona(&self, persona: &PersonaSettings) -> Result<(), StoreError> {
        self.personas
            .write()
            .await
            .insert(persona.user_id.clone(), persona.clone());
        Ok(())
    }
}
