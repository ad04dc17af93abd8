//! End-to-end integration tests for the switchyard orchestration tier.
//!
//! These exercise the full pipeline from a chat request to persisted state:
//! routing, context assembly, the permission gate, checkpoint resume and
//! both store backends, using the built-in handlers plus a recording handler.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use switchyard_classifier::KeywordClassifier;
use switchyard_config::{ClassifierConfig, HandlersConfig, RouterConfig};
use switchyard_core::error::HandlerError;
use switchyard_core::{
    Capability, ChatRequest, ChunkKind, ConversationStore, EditorContext, Envelope, ErrorKind,
    Handler, HandlerContext, HandlerOutcome, HandlerReply, InclusionPreference, OperationStatus,
    ResumeSignal, Role, RoutingReason, StreamChunk, TaskStatus,
};
use switchyard_handlers::default_registry;
use switchyard_router::Router;
use switchyard_store::{InMemoryIntelligenceCache, InMemoryStore, SqliteStore};

// ── Recording handler ────────────────────────────────────────────────────────

/// Records every envelope it receives and answers with a fixed reply.
struct RecordingHandler {
    capabilities: Vec<Capability>,
    seen: Mutex<Vec<Envelope>>,
}

impl RecordingHandler {
    fn new(capabilities: Vec<Capability>) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn invocations(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last(&self) -> Envelope {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> &str {
        "recorder"
    }

    fn description(&self) -> &str {
        "Records envelopes"
    }

    fn required_capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        self.seen.lock().unwrap().push(envelope.clone());
        ctx.emit(self.name(), "recorded").await;
        Ok(HandlerOutcome::Completed(HandlerReply::text("recorded")))
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct App {
    router: Arc<Router>,
    store: Arc<dyn ConversationStore>,
    _workspace: tempfile::TempDir,
}

fn build(
    store: Arc<dyn ConversationStore>,
    personas: Arc<dyn switchyard_core::PersonaStore>,
    recorder: Option<Arc<RecordingHandler>>,
    configure: impl FnOnce(&mut RouterConfig),
) -> App {
    let workspace = tempfile::tempdir().unwrap();
    let mut registry = default_registry(&HandlersConfig {
        workspace_dir: workspace.path().to_string_lossy().into_owned(),
        ..HandlersConfig::default()
    });
    if let Some(recorder) = recorder {
        registry.register(recorder);
    }
    let classifier = Arc::new(KeywordClassifier::from_rules(
        &ClassifierConfig::default().rules,
    ));

    let mut config = RouterConfig::default();
    configure(&mut config);

    let router = Router::new(
        config,
        registry,
        store.clone(),
        personas,
        Arc::new(InMemoryIntelligenceCache::new()),
        classifier,
    );
    App {
        router: Arc::new(router),
        store,
        _workspace: workspace,
    }
}

fn app(recorder: Option<Arc<RecordingHandler>>) -> App {
    let store = Arc::new(InMemoryStore::new());
    build(store.clone(), store, recorder, |c| c.resume_on_resolution = false)
}

fn request(query: &str) -> ChatRequest {
    ChatRequest::new(query, "user-1", "conv-1", "session-1")
}

async fn collect(app: &App, req: ChatRequest) -> Vec<StreamChunk> {
    let mut rx = app.router.stream_chat(req).unwrap();
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    chunks
}

// ── Scenario A: classified routing ───────────────────────────────────────

#[tokio::test]
async fn weather_question_routes_to_weather_agent() {
    let app = app(None);

    let chunks = collect(&app, request("What's the weather in Boston?")).await;

    let terminal: Vec<_> = chunks.iter().filter(|c| c.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    let last = chunks.last().unwrap();
    assert_eq!(last.kind, ChunkKind::Complete);
    assert_eq!(last.task_status, Some(TaskStatus::Completed));
    assert_eq!(last.producing_handler.as_deref(), Some("weather_agent"));
    assert!(
        chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Content && c.message.contains("Boston"))
    );

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].handler.as_deref(), Some("weather_agent"));
    assert_eq!(state.routing_log.last().unwrap().reason, RoutingReason::Classified);
}

// ── Scenario B: permission required, approve, resubmit ───────────────────

#[tokio::test]
async fn web_search_requires_approval_then_completes() {
    let app = app(None);

    let chunks = collect(&app, request("search the web for rust async runtimes")).await;
    let last = chunks.last().unwrap();
    assert_eq!(last.task_status, Some(TaskStatus::PermissionRequired));
    let op = last.pending_operation.clone().unwrap();
    assert_eq!(op.capability_required, Capability::NetworkFetch);
    assert_eq!(op.status, OperationStatus::Pending);

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert!(state.requires_user_input);

    let approved = app.router.approve("conv-1", &op.id).await.unwrap();
    assert_eq!(approved.status, OperationStatus::Approved);

    let outcome = app
        .router
        .chat(request("search the web for rust async runtimes"))
        .await
        .unwrap();
    assert_eq!(outcome.task_status, TaskStatus::Completed);
    assert_eq!(outcome.handler.as_deref(), Some("web_search_agent"));

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert!(
        state
            .shared_memory
            .permission_grants
            .contains(Capability::NetworkFetch)
    );
    assert!(app.router.get_pending("conv-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn approved_checkpoint_resumes_exactly_once() {
    let app = app(None);
    let op = app
        .router
        .chat(request("search the web for tokio"))
        .await
        .unwrap()
        .pending_operation
        .unwrap();
    let checkpoint = op.checkpoint_id.clone().unwrap();

    app.router.approve("conv-1", &op.id).await.unwrap();
    let resumed = app
        .router
        .resume("conv-1", &checkpoint, ResumeSignal::Approved(Capability::NetworkFetch))
        .await
        .unwrap();
    assert_eq!(resumed.task_status, TaskStatus::Completed);
    assert_eq!(resumed.handler.as_deref(), Some("web_search_agent"));

    let again = app
        .router
        .resume("conv-1", &checkpoint, ResumeSignal::Approved(Capability::NetworkFetch))
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn denied_operation_resumes_with_refusal() {
    let app = app(None);
    let op = app
        .router
        .chat(request("search the web for tokio"))
        .await
        .unwrap()
        .pending_operation
        .unwrap();

    let denied = app.router.deny("conv-1", &op.id).await.unwrap();
    assert_eq!(denied.status, OperationStatus::Denied);

    let outcome = app
        .router
        .resume(
            "conv-1",
            op.checkpoint_id.as_deref().unwrap(),
            ResumeSignal::Denied(Capability::NetworkFetch),
        )
        .await
        .unwrap();
    assert!(outcome.content.contains("won't access the web"));

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert!(state.shared_memory.permission_grants.is_empty());
}

// ── Scenario C: locked conversation ──────────────────────────────────────

#[tokio::test]
async fn locked_conversation_ignores_classifier() {
    let app = app(None);

    app.router.chat(request("start a wargame")).await.unwrap();
    let outcome = app
        .router
        .chat(request("What's the weather in Boston?"))
        .await
        .unwrap();

    assert_eq!(outcome.handler.as_deref(), Some("wargaming_agent"));
    assert_eq!(outcome.reason, Some(RoutingReason::Locked));

    let mut unlock = request("What's the weather in Boston?");
    unlock.unlock_agent = true;
    let outcome = app.router.chat(unlock).await.unwrap();
    assert_eq!(outcome.handler.as_deref(), Some("weather_agent"));
}

// ── Scenario D: editor context preference ────────────────────────────────

#[tokio::test]
async fn ignored_editor_is_never_forwarded() {
    let recorder = RecordingHandler::new(Vec::new());
    let app = app(Some(recorder.clone()));

    let editor = EditorContext::new("notes.md", "# Draft\n\nSome notes.")
        .with_preference(InclusionPreference::Ignore);
    app.router
        .chat(request("summarise this").with_agent_type("recorder").with_editor(&editor))
        .await
        .unwrap();

    let envelope = recorder.last();
    assert!(envelope.active_editor.is_none());
    let wire = serde_json::to_value(&envelope).unwrap();
    assert!(wire.get("active_editor").is_none());

    let editor = EditorContext::new("notes.md", "# Draft");
    app.router
        .chat(request("summarise this").with_agent_type("recorder").with_editor(&editor))
        .await
        .unwrap();
    assert_eq!(recorder.last().active_editor.unwrap().filename, "notes.md");
}

// ── Scenario E: idempotent approval ──────────────────────────────────────

#[tokio::test]
async fn double_approve_grants_once() {
    let app = app(None);
    let op = app
        .router
        .chat(request("search the web for tokio"))
        .await
        .unwrap()
        .pending_operation
        .unwrap();

    let first = app.router.approve("conv-1", &op.id).await.unwrap();
    let second = app.router.approve("conv-1", &op.id).await.unwrap();
    assert_eq!(first, second);

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(state.shared_memory.permission_grants.len(), 1);
    assert_eq!(
        app.router
            .audit()
            .grants_recorded("conv-1", Capability::NetworkFetch),
        1
    );

    // Deny after approve reports the existing terminal state.
    let late = app.router.deny("conv-1", &op.id).await.unwrap();
    assert_eq!(late.status, OperationStatus::Approved);
}

// ── Properties ───────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_envelope_carries_only_required_fields() {
    let recorder = RecordingHandler::new(Vec::new());
    let app = app(Some(recorder.clone()));

    app.router
        .chat(request("hello").with_agent_type("recorder"))
        .await
        .unwrap();

    let wire = serde_json::to_value(recorder.last()).unwrap();
    let mut keys: Vec<_> = wire.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        ["agent_type", "conversation_id", "query", "session_id", "user_id"]
    );
}

#[tokio::test]
async fn handler_never_runs_without_its_capability() {
    let recorder = RecordingHandler::new(vec![Capability::FileWrite]);
    let app = app(Some(recorder.clone()));

    let outcome = app
        .router
        .chat(request("write it down").with_agent_type("recorder"))
        .await
        .unwrap();
    assert_eq!(outcome.task_status, TaskStatus::PermissionRequired);
    assert_eq!(recorder.invocations(), 0);

    // Asking again does not slip past the gate or open a second operation.
    app.router
        .chat(request("write it down").with_agent_type("recorder"))
        .await
        .unwrap();
    assert_eq!(recorder.invocations(), 0);
    assert_eq!(app.router.get_pending("conv-1").await.unwrap().len(), 1);

    let op = outcome.pending_operation.unwrap();
    app.router.approve("conv-1", &op.id).await.unwrap();
    let pending = app.router.get_pending("conv-1").await.unwrap();
    assert!(pending.is_empty());

    app.router
        .chat(request("write it down").with_agent_type("recorder"))
        .await
        .unwrap();
    assert_eq!(recorder.invocations(), 1);
    assert!(recorder.last().has_capability(Capability::FileWrite));
}

#[tokio::test]
async fn handler_history_is_truncated() {
    let recorder = RecordingHandler::new(Vec::new());
    let app = app(Some(recorder.clone()));

    for i in 0..15 {
        app.router
            .chat(request(&format!("message {i}")).with_agent_type("recorder"))
            .await
            .unwrap();
    }

    let history = recorder.last().conversation_history.unwrap();
    assert_eq!(history.len(), 20);
    assert_eq!(history.last().unwrap().role, Role::Assistant);
    assert_eq!(history[0].content, "message 4");
}

#[tokio::test]
async fn concurrent_turns_append_whole_pairs() {
    let app = app(None);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let router = app.router.clone();
        tasks.push(tokio::spawn(async move {
            router
                .chat(request(&format!("What's the weather in city {i}?")))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(state.messages.len(), 16);
    for pair in state.messages.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

#[tokio::test]
async fn invalid_request_leaves_no_state() {
    let app = app(None);

    let err = app
        .router
        .chat(ChatRequest::new("hello", "user-1", "", "session-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(
        app.router
            .list_conversations("user-1")
            .await
            .unwrap()
            .is_empty()
    );
}

// ── Durability ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.db");
    let path = path.to_str().unwrap();

    let op = {
        let store = Arc::new(SqliteStore::new(path).await.unwrap());
        let app = build(store.clone(), store, None, |c| c.resume_on_resolution = false);
        app.router
            .chat(request("What's the weather in Boston?"))
            .await
            .unwrap();
        app.router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap()
    };

    let store = Arc::new(SqliteStore::new(path).await.unwrap());
    let app = build(store.clone(), store, None, |c| c.resume_on_resolution = false);

    let pending = app.router.get_pending("conv-1").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, op.id);

    app.router.approve("conv-1", &op.id).await.unwrap();
    let outcome = app
        .router
        .resume(
            "conv-1",
            op.checkpoint_id.as_deref().unwrap(),
            ResumeSignal::Approved(Capability::NetworkFetch),
        )
        .await
        .unwrap();
    assert_eq!(outcome.task_status, TaskStatus::Completed);

    let state = app.store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(state.messages[0].content, "What's the weather in Boston?");
    assert!(
        state
            .shared_memory
            .permission_grants
            .contains(Capability::NetworkFetch)
    );
    let summaries = app.router.list_conversations("user-1").await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].pending_count, 0);
}
