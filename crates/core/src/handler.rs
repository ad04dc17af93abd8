//! Handler trait — the abstraction over task handlers ("agents").
//!
//! A handler declares a static set of required capabilities and an
//! invocation function. The router never invokes a handler while one of its
//! declared capabilities is missing from the conversation's grants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::context::Envelope;
use crate::error::HandlerError;
use crate::intelligence::{CachedResult, IntelligenceCache};
use crate::permission::Capability;
use crate::store::Checkpoint;
use crate::stream::ChunkSink;

/// A signal a handler emits to update cross-turn state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "value", rename_all = "snake_case")]
pub enum StateSignal {
    /// Pin subsequent turns to this handler
    LockAgent(String),
    /// Release the conversation lock
    UnlockAgent,
}

/// A finished handler result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerReply {
    /// Final content; appended to history as the assistant message
    pub content: String,
    pub signals: Vec<StateSignal>,
}

impl HandlerReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            signals: Vec::new(),
        }
    }

    pub fn with_signal(mut self, signal: StateSignal) -> Self {
        self.signals.push(signal);
        self
    }
}

/// A handler pausing itself until a capability is approved or denied.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    pub kind: String,
    pub summary: String,
    pub capability: Capability,
    /// Opaque progress, stored in the checkpoint and handed back on resume
    pub progress: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Completed(HandlerReply),
    Suspended(Suspension),
}

/// How a suspended invocation is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "capability", rename_all = "snake_case")]
pub enum ResumeSignal {
    Approved(Capability),
    Denied(Capability),
}

/// Per-invocation services handed to a handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub conversation_id: String,
    pub sink: ChunkSink,
    pub cache: Arc<dyn IntelligenceCache>,
}

impl HandlerContext {
    pub fn new(
        conversation_id: impl Into<String>,
        sink: ChunkSink,
        cache: Arc<dyn IntelligenceCache>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sink,
            cache,
        }
    }

    /// Stream partial output.
    pub async fn emit(&self, handler: &str, text: impl Into<String>) {
        self.sink.content(handler, text).await;
    }

    /// Store a reusable result for later turns. Cache failures are logged,
    /// not propagated.
    pub async fn remember(&self, entry: CachedResult) -> Option<CachedResult> {
        match self.cache.put(&self.conversation_id, entry).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, "Cache write failed: {e}");
                None
            }
        }
    }

    pub async fn recall(&self, content_hash: &str) -> Option<CachedResult> {
        match self.cache.get(&self.conversation_id, content_hash).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, "Cache read failed: {e}");
                None
            }
        }
    }
}

/// The core Handler trait.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique registry name (e.g. "weather_agent").
    fn name(&self) -> &str;

    /// What this handler does (used by classifiers).
    fn description(&self) -> &str;

    /// Capabilities that must be granted before `invoke` is called.
    fn required_capabilities(&self) -> &[Capability] {
        &[]
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> std::result::Result<HandlerOutcome, HandlerError>;

    /// Re-enter a suspended invocation. By default an approval re-runs
    /// `invoke` and a denial produces a polite refusal.
    async fn resume(
        &self,
        envelope: &Envelope,
        _checkpoint: &Checkpoint,
        signal: ResumeSignal,
        ctx: &HandlerContext,
    ) -> std::result::Result<HandlerOutcome, HandlerError> {
        match signal {
            ResumeSignal::Approved(_) => self.invoke(envelope, ctx).await,
            ResumeSignal::Denied(capability) => Ok(HandlerOutcome::Completed(HandlerReply::text(
                format!(
                    "Understood. I won't {} for this request, so I can't complete it as asked.",
                    capability.describe()
                ),
            ))),
        }
    }

    fn info(&self) -> HandlerInfo {
        HandlerInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            required_capabilities: self.required_capabilities().to_vec(),
        }
    }
}

/// Static description of a registered handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerInfo {
    pub name: String,
    pub description: String,
    pub required_capabilities: Vec<Capability>,
}

/// Registry of handlers by name. Read-only once the router is built.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Handler descriptions, sorted by name.
    pub fn infos(&self) -> Vec<HandlerInfo> {
        let mut infos: Vec<HandlerInfo> = self.handlers.values().map(|h| h.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
