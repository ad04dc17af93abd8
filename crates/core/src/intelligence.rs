//! Conversation intelligence — content-addressed results shared between
//! the router and handlers within one conversation.
//!
//! Entries are keyed by the SHA-256 of their canonical JSON payload, so an
//! identical hash always means an identical payload. Scope is a single
//! conversation; entries are evicted with the conversation, never by TTL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::error::CacheError;

/// Words ignored by topic inference.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "let", "may", "who", "did", "get",
    "use", "what", "when", "where", "which", "with", "this", "that", "from", "they", "will",
    "would", "there", "their", "about", "into", "than", "then", "them", "these", "those",
    "please", "could", "should", "some", "tell", "give", "show", "find", "whats", "also", "like",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedKind {
    SearchResults,
    Summary,
    Fact,
    /// One-directional hint that another handler should take the next turn
    AgentSuggestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub content_hash: String,
    pub payload: serde_json::Value,
    pub kind: CachedKind,
    pub producing_agent: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub topics: Vec<String>,
}

impl CachedResult {
    pub fn new(
        payload: serde_json::Value,
        kind: CachedKind,
        producing_agent: impl Into<String>,
        topics: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self {
            content_hash: content_hash(&payload),
            payload,
            kind,
            producing_agent: producing_agent.into(),
            timestamp: Utc::now(),
            confidence: confidence.clamp(0.0, 1.0),
            topics,
        }
    }

    /// A suggestion that `suggested_agent` handle the next turn on these topics.
    pub fn suggestion(
        producing_agent: impl Into<String>,
        suggested_agent: &str,
        topics: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self::new(
            serde_json::json!({ "suggested_agent": suggested_agent }),
            CachedKind::AgentSuggestion,
            producing_agent,
            topics,
            confidence,
        )
    }

    /// The handler named by an `AgentSuggestion` entry.
    pub fn suggested_agent(&self) -> Option<&str> {
        if self.kind != CachedKind::AgentSuggestion {
            return None;
        }
        self.payload.get("suggested_agent").and_then(|v| v.as_str())
    }

    /// Number of `topics` this entry shares with the query.
    pub fn topic_overlap(&self, topics: &[String]) -> usize {
        self.topics.iter().filter(|t| topics.contains(t)).count()
    }
}

/// SHA-256 of the payload's canonical JSON form, hex encoded.
pub fn content_hash(payload: &serde_json::Value) -> String {
    let canonical = payload.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}")
}

/// Infer the topics of a piece of text: lowercase alphanumeric terms of at
/// least three characters, minus stop words, de-duplicated in order.
pub fn infer_topics(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Conversation-partitioned cache of reusable results.
#[async_trait]
pub trait IntelligenceCache: Send + Sync {
    /// Store an entry. If an entry with the same hash exists it is kept and
    /// returned unchanged.
    async fn put(
        &self,
        conversation_id: &str,
        entry: CachedResult,
    ) -> std::result::Result<CachedResult, CacheError>;

    async fn get(
        &self,
        conversation_id: &str,
        content_hash: &str,
    ) -> std::result::Result<Option<CachedResult>, CacheError>;

    /// Entries sharing at least one topic, best match first.
    async fn query_by_topic(
        &self,
        conversation_id: &str,
        topics: &[String],
    ) -> std::result::Result<Vec<CachedResult>, CacheError>;

    /// Evict every entry of a conversation.
    async fn clear_conversation(&self, conversation_id: &str)
    -> std::result::Result<(), CacheError>;
}
