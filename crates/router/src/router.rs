//! Intent router — drives one turn from request to persisted outcome.
//!
//! Per turn: lock check, explicit override, classification (with
//! collaboration hints and fallback), permission pre-check, dispatch,
//! persist, terminal chunk. Approvals, denials and checkpoint resumes run
//! under the same per-conversation lock as turns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use switchyard_config::RouterConfig;
use switchyard_core::error::{HandlerError, PermissionError, StoreError};
use switchyard_core::intelligence::infer_topics;
use switchyard_core::{
    CachedResult, ChatRequest, Checkpoint, ChunkSink, ConversationState, ConversationStore,
    ConversationSummary, DomainEvent, Envelope, Error, ErrorState, EventBus, HandlerContext,
    HandlerInfo, HandlerOutcome, HandlerRegistry, HandlerReply, IntelligenceCache,
    IntentClassifier, Message, OperationStatus, PendingOperation, PersonaSettings, PersonaStore,
    Result, ResumeSignal, RoutingDecision, RoutingReason, StateSignal, StreamChunk, Suspension,
    TaskStatus,
};
use switchyard_security::{AuditEvent, AuditLog, AuditOutcome, TracingSink};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::assembler::ContextAssembler;
use crate::dispatcher::{Dispatcher, Entry};
use crate::gate::PermissionGate;
use crate::serialize::TurnLocks;

/// Suspension kind used when the router itself gates a handler.
const PRECHECK_KIND: &str = "invoke_handler";

/// Result of a turn or a resume.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub handler: Option<String>,
    pub reason: Option<RoutingReason>,
    pub task_status: TaskStatus,
    /// The assistant message appended for this turn
    pub content: String,
    pub pending_operation: Option<PendingOperation>,
    pub error: Option<ErrorState>,
    /// False when the store rejected the turn and nothing was saved
    pub persisted: bool,
}

/// Partial update of conversation metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DependencyStatus {
    fn from_result<E: std::fmt::Display>(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                status: "ok",
                detail: None,
            },
            Err(e) => Self {
                status: "error",
                detail: Some(e.to_string()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// HealthCheck response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `ok`, `degraded` (classifier down, routing falls back) or `unavailable` (store down)
    pub status: &'static str,
    pub version: &'static str,
    pub dependencies: BTreeMap<String, DependencyStatus>,
    pub handlers: usize,
}

/// How a dispatched turn ended, before it is persisted.
struct Settled {
    task_status: TaskStatus,
    content: String,
    pending: Option<PendingOperation>,
    /// Whether `pending` was newly opened rather than reused
    pending_created: bool,
    error: Option<ErrorState>,
    signals: Vec<StateSignal>,
}

impl Settled {
    fn completed(reply: HandlerReply) -> Self {
        Self {
            task_status: TaskStatus::Completed,
            content: reply.content,
            pending: None,
            pending_created: false,
            error: None,
            signals: reply.signals,
        }
    }

    fn failed(handler: &str, err: &Error, partial: String) -> Self {
        let message = err.to_string();
        let content = if partial.trim().is_empty() {
            format!("Sorry, I couldn't complete that: {message}")
        } else {
            partial
        };
        Self {
            task_status: TaskStatus::Failed,
            content,
            pending: None,
            pending_created: false,
            error: Some(ErrorState::new(err.kind(), message, Some(handler.to_string()))),
            signals: Vec::new(),
        }
    }
}

/// The orchestration entry point. Share it behind an `Arc`.
pub struct Router {
    config: RouterConfig,
    registry: HandlerRegistry,
    assembler: ContextAssembler,
    dispatcher: Dispatcher,
    conversations: Arc<dyn ConversationStore>,
    personas: Arc<dyn PersonaStore>,
    cache: Arc<dyn IntelligenceCache>,
    classifier: Arc<dyn IntentClassifier>,
    event_bus: Arc<EventBus>,
    audit: Arc<AuditLog>,
    locks: TurnLocks,
    stream_buffer: usize,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        registry: HandlerRegistry,
        conversations: Arc<dyn ConversationStore>,
        personas: Arc<dyn PersonaStore>,
        cache: Arc<dyn IntelligenceCache>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(config.history_limit, config.intelligence_limit),
            dispatcher: Dispatcher::new(Duration::from_millis(config.handler_timeout_ms)),
            config,
            registry,
            conversations,
            personas,
            cache,
            classifier,
            event_bus: Arc::new(EventBus::default()),
            audit: Arc::new(AuditLog::with_sinks(vec![Box::new(TracingSink)])),
            locks: TurnLocks::new(),
            stream_buffer: 64,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Capacity of the per-turn chunk channel.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    pub fn handlers(&self) -> Vec<HandlerInfo> {
        self.registry.infos()
    }

    // ── StreamChat ──────────────────────────────────────────────

    /// Start a turn and return its chunk stream.
    ///
    /// Invalid requests are rejected here, before any state is touched.
    /// The stream always ends with a terminal chunk unless the receiver is
    /// dropped, which cancels the turn.
    pub fn stream_chat(self: &Arc<Self>, request: ChatRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        request.validate()?;
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let conversation_id = request.conversation_id.clone();
            if let Err(e) = router.handle(request, ChunkSink::new(tx)).await {
                warn!(conversation_id = %conversation_id, "Turn rejected: {e}");
            }
        });
        Ok(rx)
    }

    /// Run a turn without streaming, returning its outcome.
    pub async fn chat(&self, request: ChatRequest) -> Result<TurnOutcome> {
        self.handle(request, ChunkSink::detached()).await
    }

    /// Run a turn to completion, streaming into `sink`.
    pub async fn handle(&self, request: ChatRequest, sink: ChunkSink) -> Result<TurnOutcome> {
        request.validate()?;
        let _turn = self.locks.acquire(&request.conversation_id).await;
        Ok(self.run_turn(request, sink).await)
    }

    async fn run_turn(&self, request: ChatRequest, sink: ChunkSink) -> TurnOutcome {
        let started = Instant::now();
        // Classification and dispatch share one budget.
        let deadline = started
            + request
                .deadline_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.dispatcher.default_timeout());
        let conversation_id = request.conversation_id.clone();

        let mut state = match self.conversations.load(&conversation_id).await {
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::new(&conversation_id, &request.user_id),
            Err(e) => return self.unpersisted(&sink, &conversation_id, None, e.into()).await,
        };

        if request.unlock_agent
            && let Some(previous) = state.shared_memory.locked_agent.take()
        {
            info!(conversation_id = %conversation_id, handler = %previous, "Conversation unlocked by caller");
        }

        let persona = self.load_persona(&request.user_id).await;
        let intelligence = self.recall(&conversation_id, &request.query).await;
        let (envelope, report) =
            match self
                .assembler
                .assemble(&request, &state, persona, &intelligence)
            {
                Ok(built) => built,
                Err(e) => return self.unpersisted(&sink, &conversation_id, None, e).await,
            };
        debug!(
            conversation_id = %conversation_id,
            included = ?report.included,
            dropped = ?report.dropped,
            "Context assembled"
        );

        sink.send(StreamChunk::status("Routing request", None).with_conversation(&conversation_id))
            .await;

        let decision = self
            .resolve_route(&request, &state, &intelligence, deadline)
            .await;
        if decision.reason != RoutingReason::Locked && state.shared_memory.locked_agent.is_some() {
            // Only reachable when the locked handler is no longer registered.
            state.shared_memory.locked_agent = None;
        }
        let name = decision.handler.clone();

        info!(
            conversation_id = %conversation_id,
            handler = %name,
            reason = %decision.reason,
            confidence = ?decision.confidence,
            "Turn routed"
        );
        self.event_bus.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            handler: name.clone(),
            reason: decision.reason,
            timestamp: Utc::now(),
        });
        self.audit.log(
            &conversation_id,
            AuditEvent::Routed {
                handler: name.clone(),
                reason: decision.reason,
            },
            "router",
            AuditOutcome::Success,
            decision.reasoning.clone(),
        );

        let Some(handler) = self.registry.get(&name) else {
            let err = Error::Handler(HandlerError::NotFound(name.clone()));
            let settled = Settled::failed(&name, &err, String::new());
            return self
                .finish(state, Some(request.query.as_str()), Some(decision), &name, settled, &sink, started)
                .await;
        };

        sink.send(
            StreamChunk::status(format!("Routing to {name}"), Some(name.as_str()))
                .with_conversation(&conversation_id),
        )
        .await;

        let missing = PermissionGate::missing(&state, handler.required_capabilities());
        let settled = if let Some(&capability) = missing.first() {
            debug!(conversation_id = %conversation_id, handler = %name, capability = %capability, "Capability missing, not invoking");
            let suspension = Suspension {
                kind: PRECHECK_KIND.into(),
                summary: format!(
                    "{name} needs to {}: \"{}\"",
                    capability.describe(),
                    request.query.trim()
                ),
                capability,
                progress: serde_json::Value::Null,
            };
            self.suspend(&mut state, &name, suspension, envelope, request.deadline_ms)
                .await
        } else {
            let ctx = HandlerContext::new(&conversation_id, sink.clone(), self.cache.clone());
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = self
                .dispatcher
                .dispatch(handler, envelope.clone(), ctx, Entry::Invoke, Some(remaining))
                .await;
            self.settle(&mut state, &name, envelope, result, &sink, request.deadline_ms)
                .await
        };

        match settled {
            Ok(settled) => {
                self.finish(state, Some(request.query.as_str()), Some(decision), &name, settled, &sink, started)
                    .await
            }
            Err(e) => self.unpersisted(&sink, &conversation_id, Some(name.as_str()), e.into()).await,
        }
    }

    // ── Routing ─────────────────────────────────────────────────

    async fn resolve_route(
        &self,
        request: &ChatRequest,
        state: &ConversationState,
        intelligence: &[CachedResult],
        deadline: Instant,
    ) -> RoutingDecision {
        let fallback = |reasoning: String| {
            RoutingDecision::new(&self.config.default_handler, RoutingReason::Fallback)
                .with_reasoning(reasoning)
        };

        if let Some(locked) = &state.shared_memory.locked_agent {
            if self.registry.contains(locked) {
                return RoutingDecision::new(locked, RoutingReason::Locked);
            }
            warn!(conversation_id = %state.conversation_id, handler = %locked, "Locked handler is not registered, releasing lock");
            return fallback(format!("locked handler {locked} is not registered"));
        }

        if let Some(explicit) = request
            .agent_type
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            if self.registry.contains(explicit) {
                return RoutingDecision::new(explicit, RoutingReason::Explicit);
            }
            warn!(conversation_id = %state.conversation_id, handler = %explicit, "Requested handler is not registered");
            return fallback(format!("requested handler {explicit} is not registered"));
        }

        let history = state.recent_messages(self.config.history_limit);
        let timeout = Duration::from_millis(self.config.classifier_timeout_ms)
            .min(deadline.saturating_duration_since(Instant::now()));
        let classification =
            match tokio::time::timeout(timeout, self.classifier.classify(&request.query, history))
                .await
            {
                Ok(Ok(c)) => c,
                Ok(Err(e)) => {
                    warn!(classifier = %self.classifier.name(), "Classification failed, using default handler: {e}");
                    return fallback(format!("classifier unavailable: {e}"));
                }
                Err(_) => {
                    let timeout_ms = timeout.as_millis() as u64;
                    warn!(classifier = %self.classifier.name(), timeout_ms, "Classification timed out, using default handler");
                    return fallback(format!("classifier timed out after {timeout_ms}ms"));
                }
            };

        if classification.confidence >= self.config.min_confidence
            && self.registry.contains(&classification.handler)
        {
            return RoutingDecision::new(&classification.handler, RoutingReason::Classified)
                .with_confidence(classification.confidence)
                .with_reasoning(classification.reasoning);
        }

        if let Some(hint) = self.suggestion(intelligence)
            && let Some(agent) = hint.suggested_agent()
        {
            return RoutingDecision::new(agent, RoutingReason::Suggested)
                .with_confidence(hint.confidence)
                .with_reasoning(format!("suggested by {}", hint.producing_agent));
        }

        fallback(format!(
            "{} (confidence {:.2})",
            classification.reasoning, classification.confidence
        ))
        .with_confidence(classification.confidence)
    }

    /// Newest collaboration hint naming a registered handler.
    fn suggestion<'a>(&self, intelligence: &'a [CachedResult]) -> Option<&'a CachedResult> {
        intelligence
            .iter()
            .filter(|e| {
                e.suggested_agent()
                    .is_some_and(|agent| self.registry.contains(agent))
            })
            .max_by_key(|e| e.timestamp)
    }

    async fn load_persona(&self, user_id: &str) -> Option<PersonaSettings> {
        match self.personas.load_persona(user_id).await {
            Ok(persona) => persona,
            Err(e) => {
                warn!(user_id = %user_id, "Persona lookup failed: {e}");
                None
            }
        }
    }

    async fn recall(&self, conversation_id: &str, query: &str) -> Vec<CachedResult> {
        let topics = infer_topics(query);
        if topics.is_empty() {
            return Vec::new();
        }
        match self.cache.query_by_topic(conversation_id, &topics).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(conversation_id = %conversation_id, "Intelligence lookup failed: {e}");
                Vec::new()
            }
        }
    }

    // ── Outcome handling ────────────────────────────────────────

    async fn settle(
        &self,
        state: &mut ConversationState,
        handler: &str,
        envelope: Envelope,
        result: Result<HandlerOutcome>,
        sink: &ChunkSink,
        deadline_ms: Option<u64>,
    ) -> std::result::Result<Settled, StoreError> {
        match result {
            Ok(HandlerOutcome::Completed(reply)) => Ok(Settled::completed(reply)),
            Ok(HandlerOutcome::Suspended(suspension)) => {
                self.suspend(state, handler, suspension, envelope, deadline_ms)
                    .await
            }
            Err(e) => {
                warn!(conversation_id = %state.conversation_id, handler = %handler, kind = %e.kind(), "Handler failed: {e}");
                Ok(Settled::failed(handler, &e, sink.emitted().await))
            }
        }
    }

    /// Persist a checkpoint and open (or refresh) the pending operation.
    async fn suspend(
        &self,
        state: &mut ConversationState,
        handler: &str,
        suspension: Suspension,
        envelope: Envelope,
        deadline_ms: Option<u64>,
    ) -> std::result::Result<Settled, StoreError> {
        let checkpoint = Checkpoint::new(
            &state.conversation_id,
            handler,
            state.version,
            suspension.progress,
            envelope,
        )
        .with_deadline(deadline_ms);
        self.conversations.save_checkpoint(&checkpoint).await?;

        let operation = PendingOperation::new(
            suspension.kind,
            suspension.summary,
            suspension.capability,
            handler,
        )
        .with_checkpoint(&checkpoint.checkpoint_id);
        let (operation, created) = PermissionGate::request(state, operation);

        Ok(Settled {
            task_status: TaskStatus::PermissionRequired,
            content: format!(
                "Approval needed: {}. Approve or deny operation {} to continue.",
                operation.summary, operation.id
            ),
            pending: Some(operation),
            pending_created: created,
            error: None,
            signals: Vec::new(),
        })
    }

    /// Apply a settled outcome, persist it, and send the terminal chunk.
    ///
    /// `query` is `None` for resumes, which append only the assistant message.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        mut state: ConversationState,
        query: Option<&str>,
        decision: Option<RoutingDecision>,
        handler: &str,
        settled: Settled,
        sink: &ChunkSink,
        started: Instant,
    ) -> TurnOutcome {
        let conversation_id = state.conversation_id.clone();

        if let Some(query) = query {
            state.push(Message::user(query));
        }
        state.push(Message::assistant(&settled.content, handler));

        for signal in &settled.signals {
            match signal {
                StateSignal::LockAgent(agent) if self.registry.contains(agent) => {
                    state.shared_memory.locked_agent = Some(agent.clone());
                }
                StateSignal::LockAgent(agent) => {
                    warn!(conversation_id = %conversation_id, handler = %agent, "Ignoring lock on unregistered handler");
                }
                StateSignal::UnlockAgent => state.shared_memory.locked_agent = None,
            }
        }

        state.active_agent = Some(handler.to_string());
        state.is_complete = settled.task_status != TaskStatus::PermissionRequired;
        state.requires_user_input = state.has_pending();
        state.error_state = settled.error.clone();
        let reason = decision.as_ref().map(|d| d.reason);
        if let Some(decision) = decision {
            state.record_routing(decision, self.config.routing_log_limit);
        }
        state.version += 1;
        state.updated_at = Utc::now();

        if let Err(e) = self.conversations.save(&state).await {
            return self
                .unpersisted(sink, &conversation_id, Some(handler), e.into())
                .await;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let chunk = match (&settled.pending, &settled.error) {
            (Some(operation), _) => {
                self.event_bus.publish(DomainEvent::PermissionRequested {
                    conversation_id: conversation_id.clone(),
                    operation_id: operation.id.clone(),
                    capability: operation.capability_required,
                    handler: handler.to_string(),
                    timestamp: Utc::now(),
                });
                self.audit.log(
                    &conversation_id,
                    AuditEvent::PermissionRequested {
                        operation_id: operation.id.clone(),
                        capability: operation.capability_required,
                    },
                    handler,
                    if settled.pending_created {
                        AuditOutcome::Success
                    } else {
                        AuditOutcome::NoOp
                    },
                    Some(operation.summary.clone()),
                );
                StreamChunk::permission_required(operation.clone(), handler)
            }
            (None, Some(error)) => {
                self.event_bus.publish(DomainEvent::HandlerFailed {
                    conversation_id: conversation_id.clone(),
                    handler: Some(handler.to_string()),
                    kind: error.kind,
                    error_message: error.message.clone(),
                    timestamp: Utc::now(),
                });
                StreamChunk::error(&error.message, error.kind, Some(handler))
            }
            (None, None) => StreamChunk::complete(&settled.content, handler, settled.task_status),
        };

        self.event_bus.publish(DomainEvent::TurnCompleted {
            conversation_id: conversation_id.clone(),
            handler: handler.to_string(),
            task_status: settled.task_status,
            duration_ms,
            timestamp: Utc::now(),
        });
        info!(
            conversation_id = %conversation_id,
            handler = %handler,
            task_status = ?settled.task_status,
            duration_ms,
            version = state.version,
            "Turn persisted"
        );

        sink.send(chunk.with_conversation(&conversation_id)).await;

        TurnOutcome {
            conversation_id,
            handler: Some(handler.to_string()),
            reason,
            task_status: settled.task_status,
            content: settled.content,
            pending_operation: settled.pending,
            error: settled.error,
            persisted: true,
        }
    }

    /// Report a turn that could not be persisted. Nothing was saved, so the
    /// caller may retry it.
    async fn unpersisted(
        &self,
        sink: &ChunkSink,
        conversation_id: &str,
        handler: Option<&str>,
        err: Error,
    ) -> TurnOutcome {
        let kind = err.kind();
        let message = err.to_string();
        warn!(conversation_id = %conversation_id, kind = %kind, "Turn not persisted: {message}");

        self.event_bus.publish(DomainEvent::HandlerFailed {
            conversation_id: conversation_id.to_string(),
            handler: handler.map(String::from),
            kind,
            error_message: message.clone(),
            timestamp: Utc::now(),
        });
        sink.send(StreamChunk::error(&message, kind, handler).with_conversation(conversation_id))
            .await;

        TurnOutcome {
            conversation_id: conversation_id.to_string(),
            handler: handler.map(String::from),
            reason: None,
            task_status: TaskStatus::Failed,
            content: String::new(),
            pending_operation: None,
            error: Some(ErrorState::new(kind, message, handler.map(String::from))),
            persisted: false,
        }
    }

    // ── Permission gate ─────────────────────────────────────────

    /// ApprovePermission. Grants the capability and, with
    /// `resume_on_resolution`, resumes the suspended handler in the
    /// background. Repeated calls return the existing terminal state.
    pub async fn approve(
        self: &Arc<Self>,
        conversation_id: &str,
        operation_id: &str,
    ) -> Result<PendingOperation> {
        self.resolve_permission(conversation_id, operation_id, OperationStatus::Approved)
            .await
    }

    /// DenyPermission. The suspended handler is re-entered with a denial.
    pub async fn deny(
        self: &Arc<Self>,
        conversation_id: &str,
        operation_id: &str,
    ) -> Result<PendingOperation> {
        self.resolve_permission(conversation_id, operation_id, OperationStatus::Denied)
            .await
    }

    async fn resolve_permission(
        self: &Arc<Self>,
        conversation_id: &str,
        operation_id: &str,
        status: OperationStatus,
    ) -> Result<PendingOperation> {
        let resolution = {
            let _turn = self.locks.acquire(conversation_id).await;
            let mut state = self.conversations.load(conversation_id).await?.ok_or_else(|| {
                PermissionError::NotFound {
                    conversation_id: conversation_id.to_string(),
                    operation_id: operation_id.to_string(),
                }
            })?;

            let resolution = match status {
                OperationStatus::Approved => PermissionGate::approve(&mut state, operation_id)?,
                _ => PermissionGate::deny(&mut state, operation_id)?,
            };
            if resolution.changed {
                state.requires_user_input = state.has_pending();
                state.version += 1;
                state.updated_at = Utc::now();
                self.conversations.save(&state).await?;
            }
            resolution
        };

        let operation = resolution.operation;
        let capability = operation.capability_required;
        let event = match operation.status {
            OperationStatus::Approved => AuditEvent::PermissionApproved {
                operation_id: operation.id.clone(),
                capability,
            },
            _ => AuditEvent::PermissionDenied {
                operation_id: operation.id.clone(),
                capability,
            },
        };
        let outcome = match (resolution.changed, operation.status) {
            (false, _) => AuditOutcome::NoOp,
            (true, OperationStatus::Approved) => AuditOutcome::Success,
            (true, _) => AuditOutcome::Denied,
        };
        self.audit.log(conversation_id, event, "user", outcome, None);

        if !resolution.changed {
            debug!(conversation_id = %conversation_id, operation_id = %operation_id, "Operation already resolved");
            return Ok(operation);
        }

        info!(
            conversation_id = %conversation_id,
            operation_id = %operation_id,
            status = ?operation.status,
            capability = %capability,
            "Permission resolved"
        );
        self.event_bus.publish(DomainEvent::PermissionResolved {
            conversation_id: conversation_id.to_string(),
            operation_id: operation.id.clone(),
            status: operation.status,
            timestamp: Utc::now(),
        });

        if self.config.resume_on_resolution
            && let Some(checkpoint_id) = operation.checkpoint_id.clone()
        {
            let signal = match operation.status {
                OperationStatus::Approved => ResumeSignal::Approved(capability),
                _ => ResumeSignal::Denied(capability),
            };
            let router = Arc::clone(self);
            let conversation_id = conversation_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = router.resume(&conversation_id, &checkpoint_id, signal).await {
                    warn!(conversation_id = %conversation_id, checkpoint_id = %checkpoint_id, "Background resume failed: {e}");
                }
            });
        }

        Ok(operation)
    }

    /// GetPendingPermissions, oldest first. Unknown conversations have none.
    pub async fn get_pending(&self, conversation_id: &str) -> Result<Vec<PendingOperation>> {
        Ok(self
            .conversations
            .load(conversation_id)
            .await?
            .map(|state| PermissionGate::pending(&state))
            .unwrap_or_default())
    }

    // ── Resume ──────────────────────────────────────────────────

    /// Re-enter a suspended handler from its checkpoint.
    ///
    /// `signal` must match the decision recorded on the operation that owns
    /// the checkpoint: a pending operation cannot be resumed, and a denied
    /// one only with a denial. Each checkpoint can be consumed once; a
    /// second attempt fails with `CheckpointConsumed`.
    pub async fn resume(
        &self,
        conversation_id: &str,
        checkpoint_id: &str,
        signal: ResumeSignal,
    ) -> Result<TurnOutcome> {
        self.resume_with(conversation_id, checkpoint_id, signal, ChunkSink::detached())
            .await
    }

    pub async fn resume_with(
        &self,
        conversation_id: &str,
        checkpoint_id: &str,
        signal: ResumeSignal,
        sink: ChunkSink,
    ) -> Result<TurnOutcome> {
        let started = Instant::now();
        let _turn = self.locks.acquire(conversation_id).await;
        let not_found = || StoreError::CheckpointNotFound {
            conversation_id: conversation_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
        };

        let mut checkpoint = self
            .conversations
            .load_checkpoint(conversation_id, checkpoint_id)
            .await?
            .ok_or_else(not_found)?;
        if checkpoint.is_consumed() {
            return Err(StoreError::CheckpointConsumed {
                checkpoint_id: checkpoint_id.to_string(),
            }
            .into());
        }
        let mut state = self
            .conversations
            .load(conversation_id)
            .await?
            .ok_or_else(not_found)?;

        let recorded = PermissionGate::resume_signal(&state, checkpoint_id)?;
        if signal != recorded {
            warn!(conversation_id = %conversation_id, checkpoint_id = %checkpoint_id, requested = ?signal, recorded = ?recorded, "Rejecting resume");
            return Err(Error::InvalidArgument(format!(
                "resume signal {signal:?} does not match the recorded decision {recorded:?}"
            )));
        }

        // Grants may have changed since suspension.
        let mut envelope = checkpoint.envelope.clone();
        let grants = &state.shared_memory.permission_grants;
        envelope.permission_grants = (!grants.is_empty()).then(|| grants.clone());
        let pending = PermissionGate::pending(&state);
        envelope.pending_operations = (!pending.is_empty()).then_some(pending);

        let name = checkpoint.handler.clone();
        let deadline_ms = checkpoint.deadline_ms;
        info!(conversation_id = %conversation_id, checkpoint_id = %checkpoint_id, handler = %name, signal = ?recorded, "Resuming from checkpoint");
        self.event_bus.publish(DomainEvent::CheckpointResumed {
            conversation_id: conversation_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
            handler: name.clone(),
            timestamp: Utc::now(),
        });
        self.audit.log(
            conversation_id,
            AuditEvent::CheckpointResumed {
                checkpoint_id: checkpoint_id.to_string(),
            },
            &name,
            AuditOutcome::Success,
            None,
        );

        let settled = match self.registry.get(&name) {
            Some(handler) => {
                let ctx = HandlerContext::new(conversation_id, sink.clone(), self.cache.clone());
                let entry = Entry::Resume {
                    checkpoint: Box::new(checkpoint.clone()),
                    signal: recorded,
                };
                let deadline = deadline_ms.map(Duration::from_millis);
                let result = self
                    .dispatcher
                    .dispatch(handler, envelope.clone(), ctx, entry, deadline)
                    .await;
                self.settle(&mut state, &name, envelope, result, &sink, deadline_ms)
                    .await?
            }
            None => {
                let err = Error::Handler(HandlerError::NotFound(name.clone()));
                Settled::failed(&name, &err, String::new())
            }
        };

        // The state save in `finish` commits the resume; until it succeeds
        // the checkpoint stays resumable.
        PermissionGate::mark_resumed(&mut state, checkpoint_id);
        let outcome = self
            .finish(state, None, None, &name, settled, &sink, started)
            .await;
        if outcome.persisted {
            checkpoint.consumed_at = Some(Utc::now());
            if let Err(e) = self.conversations.save_checkpoint(&checkpoint).await {
                warn!(conversation_id = %conversation_id, checkpoint_id = %checkpoint_id, "Failed to mark checkpoint consumed: {e}");
            }
        }
        Ok(outcome)
    }

    // ── Conversation management ─────────────────────────────────

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        Ok(self.conversations.list_conversations(user_id).await?)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        Ok(self.conversations.load(conversation_id).await?)
    }

    /// Apply a metadata patch. Returns `None` for unknown conversations.
    pub async fn update_metadata(
        &self,
        conversation_id: &str,
        patch: MetadataPatch,
    ) -> Result<Option<ConversationState>> {
        let _turn = self.locks.acquire(conversation_id).await;
        let Some(mut state) = self.conversations.load(conversation_id).await? else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            state.metadata.title = Some(title);
        }
        if let Some(tags) = patch.tags {
            state.metadata.tags = tags;
        }
        if let Some(pinned) = patch.pinned {
            state.metadata.pinned = pinned;
        }
        if let Some(archived) = patch.archived {
            state.metadata.archived = archived;
        }
        state.version += 1;
        state.updated_at = Utc::now();
        self.conversations.save(&state).await?;
        Ok(Some(state))
    }

    /// Delete a conversation, its checkpoints and its cached intelligence.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let _turn = self.locks.acquire(conversation_id).await;
        let deleted = self.conversations.delete_conversation(conversation_id).await?;
        if let Err(e) = self.cache.clear_conversation(conversation_id).await {
            warn!(conversation_id = %conversation_id, "Failed to clear intelligence cache: {e}");
        }
        if deleted {
            info!(conversation_id = %conversation_id, "Conversation deleted");
        }
        Ok(deleted)
    }

    // ── HealthCheck ─────────────────────────────────────────────

    pub async fn health(&self) -> HealthReport {
        let mut dependencies = BTreeMap::new();

        let store = DependencyStatus::from_result(self.conversations.health_check().await);
        let timeout = Duration::from_millis(self.config.classifier_timeout_ms);
        let classifier = match tokio::time::timeout(timeout, self.classifier.health_check()).await
        {
            Ok(result) => DependencyStatus::from_result(result),
            Err(_) => DependencyStatus {
                status: "error",
                detail: Some(format!("timed out after {}ms", self.config.classifier_timeout_ms)),
            },
        };

        let status = if !store.is_ok() {
            "unavailable"
        } else if !classifier.is_ok() {
            "degraded"
        } else {
            "ok"
        };

        dependencies.insert(
            format!("store:{}", self.conversations.name()),
            store,
        );
        dependencies.insert(
            format!("classifier:{}", self.classifier.name()),
            classifier,
        );

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            dependencies,
            handlers: self.registry.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FailingStore, FlakySaveStore, ScriptedClassifier, harness, keyword_classifier,
    };
    use switchyard_core::{CachedResult, Capability, ChunkKind, ErrorKind, IntelligenceCache};
    use switchyard_store::{InMemoryIntelligenceCache, InMemoryStore};

    fn request(query: &str) -> ChatRequest {
        ChatRequest::new(query, "u1", "c1", "s1")
    }

    async fn state(h: &crate::test_support::Harness) -> ConversationState {
        h.store.load("c1").await.unwrap().unwrap()
    }

    async fn drain(mut rx: mpsc::Receiver<StreamChunk>) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn classified_turn_completes_and_persists() {
        let h = harness(keyword_classifier(), |_| {});
        let outcome = h
            .router
            .chat(request("What's the weather in Boston?"))
            .await
            .unwrap();

        assert_eq!(outcome.handler.as_deref(), Some("weather_agent"));
        assert_eq!(outcome.reason, Some(RoutingReason::Classified));
        assert_eq!(outcome.task_status, TaskStatus::Completed);
        assert!(outcome.persisted);

        let state = state(&h).await;
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.active_agent.as_deref(), Some("weather_agent"));
        assert_eq!(state.version, 1);
        assert!(state.is_complete);
        assert_eq!(state.routing_log.len(), 1);
    }

    #[tokio::test]
    async fn stream_ends_with_one_terminal_chunk() {
        let h = harness(keyword_classifier(), |_| {});
        let rx = h
            .router
            .stream_chat(request("What's the weather in Boston?"))
            .unwrap();
        let chunks = drain(rx).await;

        assert_eq!(chunks[0].kind, ChunkKind::Status);
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Content));
        let terminal: Vec<_> = chunks.iter().filter(|c| c.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        let last = chunks.last().unwrap();
        assert_eq!(last.kind, ChunkKind::Complete);
        assert_eq!(last.producing_handler.as_deref(), Some("weather_agent"));
        assert_eq!(last.conversation_id.as_deref(), Some("c1"));
        assert!(last.message.contains("Boston"));
    }

    #[tokio::test]
    async fn invalid_request_rejected_before_state() {
        let h = harness(keyword_classifier(), |_| {});
        let err = h
            .router
            .stream_chat(ChatRequest::new("", "u1", "c1", "s1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(h.store.load("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_capability_opens_pending_operation() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let outcome = h
            .router
            .chat(request("search the web for rust tutorials"))
            .await
            .unwrap();

        assert_eq!(outcome.task_status, TaskStatus::PermissionRequired);
        let op = outcome.pending_operation.unwrap();
        assert_eq!(op.capability_required, Capability::NetworkFetch);
        assert_eq!(op.handler, "web_search_agent");
        assert!(op.checkpoint_id.is_some());

        // The handler never ran, so nothing was cached.
        assert_eq!(h.cache.len("c1").await, 0);

        let state = state(&h).await;
        assert_eq!(state.messages.len(), 2);
        assert!(state.requires_user_input);
        assert!(!state.is_complete);
        assert_eq!(h.router.get_pending("c1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_request_reuses_pending_operation() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let first = h.router.chat(request("search the web for tokio")).await.unwrap();
        let second = h.router.chat(request("search the web for tokio")).await.unwrap();
        assert_eq!(
            first.pending_operation.unwrap().id,
            second.pending_operation.unwrap().id
        );
        assert_eq!(h.router.get_pending("c1").await.unwrap().len(), 1);
        assert_eq!(state(&h).await.messages.len(), 4);
    }

    #[tokio::test]
    async fn approve_is_idempotent_and_grants_once() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let op = h
            .router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();

        let first = h.router.approve("c1", &op.id).await.unwrap();
        let second = h.router.approve("c1", &op.id).await.unwrap();
        assert_eq!(first.status, OperationStatus::Approved);
        assert_eq!(first, second);

        let state = state(&h).await;
        assert_eq!(state.shared_memory.permission_grants.len(), 1);
        assert!(!state.requires_user_input);
        assert_eq!(h.router.audit().grants_recorded("c1", Capability::NetworkFetch), 1);

        let outcome = h.router.chat(request("search the web for tokio")).await.unwrap();
        assert_eq!(outcome.task_status, TaskStatus::Completed);
        assert_eq!(outcome.handler.as_deref(), Some("web_search_agent"));
    }

    #[tokio::test]
    async fn approval_resumes_in_background() {
        let h = harness(keyword_classifier(), |_| {});
        let mut events = h.router.event_bus().subscribe();
        let op = h
            .router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();
        h.router.approve("c1", &op.id).await.unwrap();

        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if let DomainEvent::TurnCompleted { task_status, .. } = event.as_ref()
                    && *task_status == TaskStatus::Completed
                {
                    break;
                }
            }
        })
        .await;
        assert!(completed.is_ok());

        let state = state(&h).await;
        // user + approval notice + resumed result
        assert_eq!(state.messages.len(), 3);
        assert!(state.messages[2].content.contains("tokio"));
        assert_eq!(h.cache.len("c1").await, 2);
    }

    #[tokio::test]
    async fn deny_resumes_with_refusal() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let op = h
            .router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();
        let denied = h.router.deny("c1", &op.id).await.unwrap();
        assert_eq!(denied.status, OperationStatus::Denied);

        let checkpoint_id = op.checkpoint_id.unwrap();
        let outcome = h
            .router
            .resume("c1", &checkpoint_id, ResumeSignal::Denied(Capability::NetworkFetch))
            .await
            .unwrap();
        assert!(outcome.content.contains("won't access the web"));
        assert!(state(&h).await.shared_memory.permission_grants.is_empty());
    }

    #[tokio::test]
    async fn checkpoint_consumed_once() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let op = h
            .router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();
        h.router.approve("c1", &op.id).await.unwrap();
        let checkpoint_id = op.checkpoint_id.unwrap();

        let signal = ResumeSignal::Approved(Capability::NetworkFetch);
        let first = h.router.resume("c1", &checkpoint_id, signal).await.unwrap();
        assert_eq!(first.task_status, TaskStatus::Completed);

        let err = h.router.resume("c1", &checkpoint_id, signal).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Store(StoreError::CheckpointConsumed { .. })
        ));

        let missing = h.router.resume("c1", "nope", signal).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn resume_while_pending_is_rejected() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let op = h
            .router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();
        let checkpoint_id = op.checkpoint_id.clone().unwrap();
        let signal = ResumeSignal::Approved(Capability::NetworkFetch);

        let err = h.router.resume("c1", &checkpoint_id, signal).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(h.cache.len("c1").await, 0);
        let state = state(&h).await;
        assert!(state.shared_memory.permission_grants.is_empty());
        assert_eq!(state.messages.len(), 2);
        assert_eq!(h.router.get_pending("c1").await.unwrap().len(), 1);

        // The rejected attempt did not use up the checkpoint.
        h.router.approve("c1", &op.id).await.unwrap();
        let outcome = h.router.resume("c1", &checkpoint_id, signal).await.unwrap();
        assert_eq!(outcome.task_status, TaskStatus::Completed);
        assert_eq!(h.cache.len("c1").await, 2);
    }

    #[tokio::test]
    async fn approved_signal_after_deny_is_rejected() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let op = h
            .router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();
        h.router.deny("c1", &op.id).await.unwrap();
        let checkpoint_id = op.checkpoint_id.unwrap();

        let err = h
            .router
            .resume("c1", &checkpoint_id, ResumeSignal::Approved(Capability::NetworkFetch))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(h.cache.len("c1").await, 0);
        assert!(state(&h).await.shared_memory.permission_grants.is_empty());

        let outcome = h
            .router
            .resume("c1", &checkpoint_id, ResumeSignal::Denied(Capability::NetworkFetch))
            .await
            .unwrap();
        assert!(outcome.content.contains("won't access the web"));
        assert_eq!(h.cache.len("c1").await, 0);
    }

    #[tokio::test]
    async fn resume_can_be_retried_after_failed_save() {
        let store = Arc::new(FlakySaveStore::default());
        let config = RouterConfig {
            resume_on_resolution: false,
            ..RouterConfig::default()
        };
        let router = Arc::new(Router::new(
            config,
            switchyard_handlers::default_registry(&Default::default()),
            store.clone(),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryIntelligenceCache::new()),
            keyword_classifier(),
        ));
        let op = router
            .chat(request("search the web for tokio"))
            .await
            .unwrap()
            .pending_operation
            .unwrap();
        router.approve("c1", &op.id).await.unwrap();
        let checkpoint_id = op.checkpoint_id.unwrap();
        let signal = ResumeSignal::Approved(Capability::NetworkFetch);

        store.fail_saves(true);
        let failed = router.resume("c1", &checkpoint_id, signal).await.unwrap();
        assert!(!failed.persisted);
        assert_eq!(
            failed.error.map(|e| e.kind),
            Some(ErrorKind::StoreUnavailable)
        );
        let checkpoint = store.load_checkpoint("c1", &checkpoint_id).await.unwrap().unwrap();
        assert!(!checkpoint.is_consumed());

        store.fail_saves(false);
        let retried = router.resume("c1", &checkpoint_id, signal).await.unwrap();
        assert!(retried.persisted);
        assert_eq!(retried.task_status, TaskStatus::Completed);
        let checkpoint = store.load_checkpoint("c1", &checkpoint_id).await.unwrap().unwrap();
        assert!(checkpoint.is_consumed());
        assert_eq!(store.load("c1").await.unwrap().unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn resume_keeps_the_turn_deadline() {
        let h = harness(keyword_classifier(), |c| c.resume_on_resolution = false);
        let mut req = request("fetch it slowly").with_agent_type("slow_fetch");
        req.deadline_ms = Some(100);
        let op = h.router.chat(req).await.unwrap().pending_operation.unwrap();
        let checkpoint_id = op.checkpoint_id.clone().unwrap();
        let checkpoint = h.store.load_checkpoint("c1", &checkpoint_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.deadline_ms, Some(100));

        h.router.approve("c1", &op.id).await.unwrap();
        let started = Instant::now();
        let outcome = h
            .router
            .resume("c1", &checkpoint_id, ResumeSignal::Approved(Capability::NetworkFetch))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            outcome.error.map(|e| e.kind),
            Some(ErrorKind::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let h = harness(keyword_classifier(), |_| {});
        h.router.chat(request("hello")).await.unwrap();
        let err = h.router.approve("c1", "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h.router.deny("nowhere", "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn lock_takes_precedence_over_classifier() {
        let h = harness(keyword_classifier(), |_| {});
        let mut state = ConversationState::new("c1", "u1");
        state.shared_memory.locked_agent = Some("wargaming_agent".into());
        h.store.save(&state).await.unwrap();

        let outcome = h
            .router
            .chat(request("What's the weather in Boston?"))
            .await
            .unwrap();
        assert_eq!(outcome.handler.as_deref(), Some("wargaming_agent"));
        assert_eq!(outcome.reason, Some(RoutingReason::Locked));

        // Explicit overrides do not break a lock either.
        let outcome = h
            .router
            .chat(request("forecast please").with_agent_type("weather_agent"))
            .await
            .unwrap();
        assert_eq!(outcome.reason, Some(RoutingReason::Locked));
    }

    #[tokio::test]
    async fn unlock_request_releases_lock() {
        let h = harness(keyword_classifier(), |_| {});
        let mut state = ConversationState::new("c1", "u1");
        state.shared_memory.locked_agent = Some("wargaming_agent".into());
        h.store.save(&state).await.unwrap();

        let mut req = request("What's the weather in Boston?");
        req.unlock_agent = true;
        let outcome = h.router.chat(req).await.unwrap();
        assert_eq!(outcome.handler.as_deref(), Some("weather_agent"));
        assert!(self::state(&h).await.shared_memory.locked_agent.is_none());
    }

    #[tokio::test]
    async fn handler_signals_lock_and_unlock() {
        let h = harness(keyword_classifier(), |_| {});
        h.router.chat(request("start a wargame")).await.unwrap();
        assert_eq!(
            state(&h).await.shared_memory.locked_agent.as_deref(),
            Some("wargaming_agent")
        );

        let outcome = h.router.chat(request("end simulation")).await.unwrap();
        assert_eq!(outcome.reason, Some(RoutingReason::Locked));
        assert!(state(&h).await.shared_memory.locked_agent.is_none());
    }

    #[tokio::test]
    async fn explicit_override_and_unknown_fallback() {
        let h = harness(keyword_classifier(), |_| {});
        let outcome = h
            .router
            .chat(request("anything at all").with_agent_type("weather_agent"))
            .await
            .unwrap();
        assert_eq!(outcome.reason, Some(RoutingReason::Explicit));
        assert_eq!(outcome.handler.as_deref(), Some("weather_agent"));

        let outcome = h
            .router
            .chat(request("anything at all").with_agent_type("nonexistent"))
            .await
            .unwrap();
        assert_eq!(outcome.reason, Some(RoutingReason::Fallback));
        assert_eq!(outcome.handler.as_deref(), Some("chat"));
    }

    #[tokio::test]
    async fn classifier_failure_falls_back() {
        let h = harness(Arc::new(ScriptedClassifier::failing()), |_| {});
        let outcome = h.router.chat(request("What's the weather?")).await.unwrap();
        assert_eq!(outcome.handler.as_deref(), Some("chat"));
        assert_eq!(outcome.reason, Some(RoutingReason::Fallback));
        assert_eq!(outcome.task_status, TaskStatus::Completed);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn slow_classifier_stays_within_turn_deadline() {
        let classifier = Arc::new(
            ScriptedClassifier::routes_to("weather_agent", 0.9).delayed(Duration::from_secs(10)),
        );
        let h = harness(classifier, |c| c.classifier_timeout_ms = 30_000);
        let mut req = request("What's the weather in Boston?");
        req.deadline_ms = Some(200);

        let started = Instant::now();
        let outcome = h.router.chat(req).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.reason, Some(RoutingReason::Fallback));
        assert!(outcome.persisted);

        let state = state(&h).await;
        let reasoning = state.routing_log[0].reasoning.clone().unwrap_or_default();
        assert!(reasoning.contains("timed out"));
    }

    #[tokio::test]
    async fn low_confidence_follows_suggestion() {
        let h = harness(
            Arc::new(ScriptedClassifier::routes_to("weather_agent", 0.1)),
            |c| c.resume_on_resolution = false,
        );
        h.cache
            .put(
                "c1",
                CachedResult::suggestion(
                    "web_search_agent",
                    "document_writer",
                    vec!["borrow".into(), "checker".into()],
                    0.6,
                ),
            )
            .await
            .unwrap();

        let outcome = h
            .router
            .chat(request("borrow checker notes"))
            .await
            .unwrap();
        assert_eq!(outcome.reason, Some(RoutingReason::Suggested));
        assert_eq!(outcome.handler.as_deref(), Some("document_writer"));
    }

    #[tokio::test]
    async fn low_confidence_without_hint_uses_default() {
        let h = harness(Arc::new(ScriptedClassifier::routes_to("weather_agent", 0.1)), |_| {});
        let outcome = h.router.chat(request("hmm")).await.unwrap();
        assert_eq!(outcome.reason, Some(RoutingReason::Fallback));
        assert_eq!(outcome.handler.as_deref(), Some("chat"));
    }

    #[tokio::test]
    async fn timeout_records_error_and_keeps_partial_output() {
        let h = harness(keyword_classifier(), |_| {});
        let mut req = request("go slowly").with_agent_type("slow");
        req.deadline_ms = Some(50);
        let rx = h.router.stream_chat(req).unwrap();
        let chunks = drain(rx).await;

        let last = chunks.last().unwrap();
        assert_eq!(last.kind, ChunkKind::Error);
        assert_eq!(last.error_kind, Some(ErrorKind::DeadlineExceeded));

        let state = state(&h).await;
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "Working...");
        assert_eq!(
            state.error_state.as_ref().map(|e| e.kind),
            Some(ErrorKind::DeadlineExceeded)
        );
        assert_eq!(state.active_agent.as_deref(), Some("slow"));
        assert!(state.is_complete);
    }

    #[tokio::test]
    async fn store_unavailable_is_surfaced_and_nothing_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let router = Arc::new(Router::new(
            RouterConfig::default(),
            switchyard_handlers::default_registry(&Default::default()),
            Arc::new(FailingStore),
            store,
            Arc::new(InMemoryIntelligenceCache::new()),
            keyword_classifier(),
        ));
        let chunks = drain(router.stream_chat(request("hello")).unwrap()).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Error);
        assert_eq!(chunks[0].error_kind, Some(ErrorKind::StoreUnavailable));

        let health = router.health().await;
        assert_eq!(health.status, "unavailable");
    }

    #[tokio::test]
    async fn history_given_to_classifier_is_bounded() {
        let classifier = Arc::new(ScriptedClassifier::routes_to("chat", 0.9));
        let h = harness(classifier.clone(), |_| {});
        for i in 0..12 {
            h.router.chat(request(&format!("message {i}"))).await.unwrap();
        }
        let seen = classifier.seen_history();
        assert_eq!(seen[0], 0);
        assert_eq!(seen[1], 2);
        assert_eq!(*seen.last().unwrap(), 20);
        assert_eq!(state(&h).await.messages.len(), 24);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_conversation_serialize() {
        let h = harness(Arc::new(ScriptedClassifier::routes_to("chat", 0.9)), |_| {});
        let mut tasks = Vec::new();
        for i in 0..5 {
            let router = h.router.clone();
            tasks.push(tokio::spawn(async move {
                router.chat(request(&format!("turn {i}"))).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let state = state(&h).await;
        assert_eq!(state.messages.len(), 10);
        assert_eq!(state.version, 5);
        for pair in state.messages.chunks(2) {
            assert_eq!(pair[0].role, switchyard_core::Role::User);
            assert_eq!(pair[1].role, switchyard_core::Role::Assistant);
        }
    }

    #[tokio::test]
    async fn health_reports_degraded_classifier() {
        let h = harness(Arc::new(ScriptedClassifier::failing()), |_| {});
        let health = h.router.health().await;
        assert_eq!(health.status, "degraded");
        assert!(health.dependencies["store:memory"].is_ok());
        assert!(!health.dependencies["classifier:scripted"].is_ok());
        assert_eq!(health.handlers, 7);

        let h = harness(keyword_classifier(), |_| {});
        assert_eq!(h.router.health().await.status, "ok");
    }

    #[tokio::test]
    async fn metadata_patch_and_delete() {
        let h = harness(keyword_classifier(), |_| {});
        h.router.chat(request("hello there")).await.unwrap();

        let patched = h
            .router
            .update_metadata(
                "c1",
                MetadataPatch {
                    pinned: Some(true),
                    tags: Some(vec!["work".into()]),
                    ..MetadataPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(patched.metadata.pinned);
        assert_eq!(patched.metadata.title.as_deref(), Some("hello there"));

        let listed = h.router.list_conversations("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tags, vec!["work".to_string()]);

        assert!(h.router.delete_conversation("c1").await.unwrap());
        assert!(h.router.get_conversation("c1").await.unwrap().is_none());
        assert!(!h.router.delete_conversation("c1").await.unwrap());
        assert!(
            h.router
                .update_metadata("c1", MetadataPatch::default())
                .await
                .unwrap()
                .is_none()
        );
    }
}
