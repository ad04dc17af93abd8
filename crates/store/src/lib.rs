//! Conversation store backends and the conversation intelligence cache.

pub mod in_memory;
pub mod intelligence;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use intelligence::InMemoryIntelligenceCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::Arc;
use switchyard_config::{AppConfig, StoreBackend};
use switchyard_core::error::StoreError;
use switchyard_core::{ConversationStore, PersonaStore};
use tracing::info;

/// The conversation and persona stores of one backend.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub personas: Arc<dyn PersonaStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            conversations: store.clone(),
            personas: store,
        }
    }
}

/// Open the configured backend and seed persona records from config.
pub async fn open_from_config(config: &AppConfig) -> Result<Stores, StoreError> {
    let stores = match config.store.backend {
        StoreBackend::Memory => Stores::in_memory(),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            if let Some(parent) = std::path::Path::new(&config.store.path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
            let store = Arc::new(SqliteStore::new(&config.store.path).await?);
            Stores {
                conversations: store.clone(),
                personas: store,
            }
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => {
            return Err(StoreError::Unavailable(
                "built without the sqlite feature".into(),
            ));
        }
    };

    for persona in &config.personas {
        stores.personas.save_persona(persona).await?;
    }
    info!(
        backend = stores.conversations.name(),
        personas = config.personas.len(),
        "Conversation store ready"
    );
    Ok(stores)
}
