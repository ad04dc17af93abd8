//! In-memory conversation intelligence cache.
//!
//! Partitioned by conversation: a lookup never sees another conversation's
//! entries. Entries live until the conversation is cleared.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::error::CacheError;
use switchyard_core::intelligence::content_hash;
use switchyard_core::{CachedResult, IntelligenceCache};
use tokio::sync::RwLock;
use tracing::debug;

type Partition = HashMap<String, CachedResult>;

pub struct InMemoryIntelligenceCache {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
}

impl InMemoryIntelligenceCache {
    pub fn new() -> Self {
        Self {
            partitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Entries held for one conversation.
    pub async fn len(&self, conversation_id: &str) -> usize {
        self.partitions
            .read()
            .await
            .get(conversation_id)
            .map_or(0, |p| p.len())
    }
}

impl Default for InMemoryIntelligenceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntelligenceCache for InMemoryIntelligenceCache {
    async fn put(
        &self,
        conversation_id: &str,
        mut entry: CachedResult,
    ) -> Result<CachedResult, CacheError> {
        // The key is always derived from the payload
        entry.content_hash = content_hash(&entry.payload);

        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(conversation_id.to_string()).or_default();
        if let Some(existing) = partition.get(&entry.content_hash) {
            debug!(conversation_id, hash = %entry.content_hash, "Cache hit on put, keeping existing entry");
            return Ok(existing.clone());
        }
        partition.insert(entry.content_hash.clone(), entry.clone());
        Ok(entry)
    }

    async fn get(
        &self,
        conversation_id: &str,
        content_hash: &str,
    ) -> Result<Option<CachedResult>, CacheError> {
        Ok(self
            .partitions
            .read()
            .await
            .get(conversation_id)
            .and_then(|p| p.get(content_hash))
            .cloned())
    }

    async fn query_by_topic(
        &self,
        conversation_id: &str,
        topics: &[String],
    ) -> Result<Vec<CachedResult>, CacheError> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<(usize, CachedResult)> = partition
            .values()
            .map(|e| (e.topic_overlap(topics), e))
            .filter(|(overlap, _)| *overlap > 0)
            .map(|(overlap, e)| (overlap, e.clone()))
            .collect();

        matches.sort_by(|(oa, a), (ob, b)| {
            ob.cmp(oa)
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        Ok(matches.into_iter().map(|(_, e)| e).collect())
    }

    async fn clear_conversation(&self, conversation_id: &str) -> Result<(), CacheError> {
        self.partitions.write().await.remove(conversation_id);
        Ok(())
    }
}
