//! Test doubles and a wired-up router for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchyard_classifier::KeywordClassifier;
use switchyard_config::{ClassifierConfig, HandlersConfig, RouterConfig};
use switchyard_core::error::{ClassifierError, HandlerError, StoreError};
use switchyard_core::{
    Capability, Checkpoint, ChunkSink, Classification, ConversationState, ConversationStore,
    ConversationSummary, Envelope, Handler, HandlerContext, HandlerOutcome, HandlerReply,
    IntentClassifier, Message,
};
use switchyard_store::{InMemoryIntelligenceCache, InMemoryStore};

use crate::Router;

pub fn envelope(query: &str) -> Envelope {
    Envelope {
        query: query.into(),
        user_id: "u1".into(),
        conversation_id: "c1".into(),
        session_id: "s1".into(),
        ..Envelope::default()
    }
}

pub fn handler_ctx(sink: ChunkSink) -> HandlerContext {
    HandlerContext::new("c1", sink, Arc::new(InMemoryIntelligenceCache::new()))
}

/// Streams a little output, then sleeps.
pub struct SlowHandler {
    name: &'static str,
    delay: Duration,
    capabilities: Vec<Capability>,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            name: "slow",
            delay,
            capabilities: Vec::new(),
        }
    }

    /// A slow handler that first needs `capability`.
    pub fn gated(name: &'static str, delay: Duration, capability: Capability) -> Self {
        Self {
            name,
            delay,
            capabilities: vec![capability],
        }
    }
}

#[async_trait]
impl Handler for SlowHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Takes its time"
    }

    fn required_capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn invoke(
        &self,
        _envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        ctx.emit(self.name(), "Working...").await;
        tokio::time::sleep(self.delay).await;
        Ok(HandlerOutcome::Completed(HandlerReply::text("done")))
    }
}

/// Returns a fixed classification (or error) and records the history
/// length it was given.
pub struct ScriptedClassifier {
    result: Result<Classification, ClassifierError>,
    delay: Option<Duration>,
    seen_history: Mutex<Vec<usize>>,
}

impl ScriptedClassifier {
    pub fn routes_to(handler: &str, confidence: f64) -> Self {
        Self {
            result: Ok(Classification::new(handler, confidence, "scripted")),
            delay: None,
            seen_history: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(ClassifierError::Unavailable("upstream down".into())),
            delay: None,
            seen_history: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen_history(&self) -> Vec<usize> {
        self.seen_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(
        &self,
        _query: &str,
        recent_history: &[Message],
    ) -> Result<Classification, ClassifierError> {
        self.seen_history.lock().unwrap().push(recent_history.len());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }

    async fn health_check(&self) -> Result<(), ClassifierError> {
        self.result.as_ref().map(|_| ()).map_err(Clone::clone)
    }
}

/// A conversation store whose backend is always unreachable.
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("database is down".into())
}

#[async_trait]
impl ConversationStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn load(&self, _conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Err(down())
    }

    async fn save(&self, _state: &ConversationState) -> Result<(), StoreError> {
        Err(down())
    }

    async fn save_checkpoint(&self, _checkpoint: &Checkpoint) -> Result<(), StoreError> {
        Err(down())
    }

    async fn load_checkpoint(
        &self,
        _conversation_id: &str,
        _checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        Err(down())
    }

    async fn list_conversations(&self, _user_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        Err(down())
    }

    async fn delete_conversation(&self, _conversation_id: &str) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(down())
    }
}

/// The in-memory store, except that `save` fails while the switch is on.
#[derive(Default)]
pub struct FlakySaveStore {
    inner: InMemoryStore,
    fail_saves: AtomicBool,
}

impl FlakySaveStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversationStore for FlakySaveStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        self.inner.load(conversation_id).await
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(down());
        }
        self.inner.save(state).await
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.inner.save_checkpoint(checkpoint).await
    }

    async fn load_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        self.inner.load_checkpoint(conversation_id, checkpoint_id).await
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        self.inner.list_conversations(user_id).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_conversation(conversation_id).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}

/// A router over the in-memory store with the built-in handlers plus two
/// [`SlowHandler`]s: `slow`, and `slow_fetch` gated on network access.
pub struct Harness {
    pub router: Arc<Router>,
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<InMemoryIntelligenceCache>,
    pub workspace: tempfile::TempDir,
}

pub fn keyword_classifier() -> Arc<dyn IntentClassifier> {
    Arc::new(KeywordClassifier::from_rules(&ClassifierConfig::default().rules))
}

pub fn harness(
    classifier: Arc<dyn IntentClassifier>,
    configure: impl FnOnce(&mut RouterConfig),
) -> Harness {
    let workspace = tempfile::tempdir().unwrap();
    let mut registry = switchyard_handlers::default_registry(&HandlersConfig {
        workspace_dir: workspace.path().to_string_lossy().into_owned(),
        ..HandlersConfig::default()
    });
    registry.register(Arc::new(SlowHandler::new(Duration::from_secs(30))));
    registry.register(Arc::new(SlowHandler::gated(
        "slow_fetch",
        Duration::from_secs(30),
        Capability::NetworkFetch,
    )));

    let mut config = RouterConfig::default();
    configure(&mut config);

    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryIntelligenceCache::new());
    let router = Router::new(
        config,
        registry,
        store.clone(),
        store.clone(),
        cache.clone(),
        classifier,
    );
    Harness {
        router: Arc::new(router),
        store,
        cache,
        workspace,
    }
}
