//! HTTP API v1 — the router's RPC surface.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`                                            — StreamChat, chunks collected into a JSON array
//! - `POST /v1/chat/stream`                                     — StreamChat as SSE
//! - `GET  /v1/ws`                                              — StreamChat over WebSocket
//! - `GET  /v1/events`                                          — SSE domain event feed
//! - `GET  /v1/handlers`                                        — Registered handlers
//! - `GET  /v1/conversations?user_id=`                          — List conversations
//! - `GET|PATCH|DELETE /v1/conversations/{id}`                  — Read, update metadata, delete
//! - `GET  /v1/conversations/{id}/permissions`                  — GetPendingPermissions
//! - `POST /v1/conversations/{id}/permissions/{op_id}/approve`  — ApprovePermission
//! - `POST /v1/conversations/{id}/permissions/{op_id}/deny`     — DenyPermission
//! - `POST /v1/conversations/{id}/checkpoints/{cp_id}/resume`   — Resume a suspended handler
//! - `GET  /v1/conversations/{id}/audit`                        — Audit trail

use axum::{
    Router,
    extract::rejection::JsonRejection,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use switchyard_core::{
    ChatRequest, ConversationState, ConversationSummary, Error, ErrorKind, HandlerInfo,
    PendingOperation, ResumeSignal, StreamChunk,
};
use switchyard_router::{MetadataPatch, TurnOutcome};
use switchyard_security::AuditEntry;

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/ws", get(ws_handler))
        .route("/events", get(event_stream_handler))
        .route("/handlers", get(list_handlers_handler))
        .route("/conversations", get(list_conversations_handler))
        .route(
            "/conversations/{id}",
            get(get_conversation_handler)
                .patch(update_conversation_handler)
                .delete(delete_conversation_handler),
        )
        .route("/conversations/{id}/permissions", get(list_pending_handler))
        .route(
            "/conversations/{id}/permissions/{op_id}/approve",
            post(approve_handler),
        )
        .route(
            "/conversations/{id}/permissions/{op_id}/deny",
            post(deny_handler),
        )
        .route(
            "/conversations/{id}/checkpoints/{checkpoint_id}/resume",
            post(resume_handler),
        )
        .route("/conversations/{id}/audit", get(audit_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Error body: `{"error": {"kind": ..., "message": ...}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: status_for(kind),
            kind,
            message: message.into(),
        }
    }

    fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{what} not found"))
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionRequired => StatusCode::FORBIDDEN,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut err = Self::new(ErrorKind::InvalidArgument, rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            err.status = StatusCode::PAYLOAD_TOO_LARGE;
        }
        err
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize, Deserialize)]
struct ErrorDetail {
    kind: ErrorKind,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(kind = %self.kind, "Request failed: {}", self.message);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct HandlerListResponse {
    handlers: Vec<HandlerInfo>,
    count: usize,
}

#[derive(Deserialize)]
struct ListConversationsQuery {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ConversationListResponse {
    conversations: Vec<ConversationSummary>,
}

#[derive(Serialize, Deserialize)]
struct PendingListResponse {
    conversation_id: String,
    operations: Vec<PendingOperation>,
}

#[derive(Serialize, Deserialize)]
struct AuditListResponse {
    conversation_id: String,
    entries: Vec<AuditEntry>,
}

// ── Streaming ─────────────────────────────────────────────────────────────

/// Forward router chunks, appending an `unavailable` error chunk if the
/// router stream ends before a terminal chunk.
fn with_terminal_guard(
    rx: mpsc::Receiver<StreamChunk>,
    conversation_id: String,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    futures::stream::unfold(Some((rx, false)), move |state| {
        let conversation_id = conversation_id.clone();
        async move {
            let (mut rx, terminal) = state?;
            match rx.recv().await {
                Some(chunk) => {
                    let terminal = terminal || chunk.is_terminal();
                    Some((chunk, Some((rx, terminal))))
                }
                None if terminal => None,
                None => {
                    warn!(conversation_id = %conversation_id, "Stream ended without a terminal chunk");
                    let chunk = StreamChunk::error(
                        "The router stopped before finishing this turn",
                        ErrorKind::StoreUnavailable,
                        None,
                    )
                    .with_conversation(&conversation_id);
                    Some((chunk, None))
                }
            }
        }
    })
}

fn start_stream(
    state: &SharedState,
    request: ChatRequest,
) -> ApiResult<impl Stream<Item = StreamChunk> + Send + 'static + use<>> {
    let conversation_id = request.conversation_id.clone();
    info!(
        conversation_id = %conversation_id,
        agent_type = ?request.agent_type,
        "StreamChat request"
    );
    let rx = state.router.stream_chat(request)?;
    Ok(with_terminal_guard(rx, conversation_id))
}

fn sse_event(chunk: &StreamChunk) -> SseEvent {
    let data = serde_json::to_string(chunk).unwrap_or_default();
    SseEvent::default().event(chunk.event_type()).data(data)
}

/// `POST /v1/chat` — run a turn and return every chunk it produced.
async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<StreamChunk>>> {
    let Json(request) = payload?;
    let chunks: Vec<StreamChunk> = start_stream(&state, request)?.collect().await;
    Ok(Json(chunks))
}

/// `POST /v1/chat/stream` — run a turn as Server-Sent Events.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let Json(request) = payload?;
    let stream = start_stream(&state, request)?.map(|chunk| Ok(sse_event(&chunk)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── WebSocket ─────────────────────────────────────────────────────────────

/// `GET /v1/ws` — StreamChat over a WebSocket.
///
/// Protocol:
/// - Client → Server: one `ChatRequest` JSON object per turn
/// - Server → Client: `StreamChunk` JSON frames, ending with a terminal chunk
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn send_chunk(socket: &mut WebSocket, chunk: &StreamChunk) -> bool {
    let json = serde_json::to_string(chunk).unwrap_or_default();
    socket.send(WsMessage::Text(json.into())).await.is_ok()
}

async fn handle_ws_connection(mut socket: WebSocket, state: SharedState) {
    info!("WebSocket connection established");

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        };

        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                let chunk =
                    StreamChunk::error(format!("Invalid request: {e}"), ErrorKind::InvalidArgument, None);
                if !send_chunk(&mut socket, &chunk).await {
                    break;
                }
                continue;
            }
        };

        let conversation_id = request.conversation_id.clone();
        match start_stream(&state, request) {
            Ok(stream) => {
                let mut stream = std::pin::pin!(stream);
                while let Some(chunk) = stream.next().await {
                    if !send_chunk(&mut socket, &chunk).await {
                        // Dropping the stream cancels the turn.
                        info!(conversation_id = %conversation_id, "WebSocket client went away mid-turn");
                        return;
                    }
                }
            }
            Err(e) => {
                let chunk = StreamChunk::error(e.message, e.kind, None);
                if !send_chunk(&mut socket, &chunk).await {
                    break;
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

// ── SSE event feed ────────────────────────────────────────────────────────

/// `GET /v1/events` — domain events as they are published.
async fn event_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.router.event_bus().subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.event_type()).data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── Handlers & conversations ──────────────────────────────────────────────

async fn list_handlers_handler(State(state): State<SharedState>) -> Json<HandlerListResponse> {
    let handlers = state.router.handlers();
    let count = handlers.len();
    Json(HandlerListResponse { handlers, count })
}

async fn list_conversations_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<ConversationListResponse>> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidArgument, "user_id is required"))?;
    let conversations = state.router.list_conversations(&user_id).await?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationState>> {
    state
        .router
        .get_conversation(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("conversation {id}")))
}

async fn update_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<MetadataPatch>, JsonRejection>,
) -> ApiResult<Json<ConversationState>> {
    let Json(patch) = payload?;
    state
        .router
        .update_metadata(&id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("conversation {id}")))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.router.delete_conversation(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("conversation {id}")))
    }
}

// ── Permissions ───────────────────────────────────────────────────────────

async fn list_pending_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PendingListResponse>> {
    let operations = state.router.get_pending(&id).await?;
    Ok(Json(PendingListResponse {
        conversation_id: id,
        operations,
    }))
}

async fn approve_handler(
    State(state): State<SharedState>,
    Path((id, op_id)): Path<(String, String)>,
) -> ApiResult<Json<PendingOperation>> {
    Ok(Json(state.router.approve(&id, &op_id).await?))
}

async fn deny_handler(
    State(state): State<SharedState>,
    Path((id, op_id)): Path<(String, String)>,
) -> ApiResult<Json<PendingOperation>> {
    Ok(Json(state.router.deny(&id, &op_id).await?))
}

/// Body: `{"decision": "approved" | "denied", "capability": "network-fetch"}`.
/// The decision must match the one recorded on the operation.
async fn resume_handler(
    State(state): State<SharedState>,
    Path((id, checkpoint_id)): Path<(String, String)>,
    payload: Result<Json<ResumeSignal>, JsonRejection>,
) -> ApiResult<Json<TurnOutcome>> {
    let Json(signal) = payload?;
    Ok(Json(state.router.resume(&id, &checkpoint_id, signal).await?))
}

async fn audit_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<AuditListResponse> {
    let entries = state.router.audit().for_conversation(&id);
    Json(AuditListResponse {
        conversation_id: id,
        entries,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestApp, test_app};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use switchyard_core::{Capability, ChunkKind, ConversationStore, OperationStatus, TaskStatus};
    use tower::ServiceExt;

    fn chat_body(query: &str) -> serde_json::Value {
        serde_json::json!({
            "query": query,
            "user_id": "u1",
            "conversation_id": "c1",
            "session_id": "s1",
        })
    }

    async fn send(test: &TestApp, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        test.router().oneshot(req).await.unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn chat(test: &TestApp, query: &str) -> Vec<StreamChunk> {
        let response = send(test, "POST", "/v1/chat", Some(chat_body(query))).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    #[tokio::test]
    async fn chat_returns_ordered_chunks() {
        let test = test_app(|_| {});
        let chunks = chat(&test, "What's the weather in Boston?").await;

        assert_eq!(chunks.first().unwrap().kind, ChunkKind::Status);
        let last = chunks.last().unwrap();
        assert_eq!(last.kind, ChunkKind::Complete);
        assert_eq!(last.task_status, Some(TaskStatus::Completed));
        assert_eq!(last.producing_handler.as_deref(), Some("weather_agent"));
        assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn chat_rejects_missing_fields() {
        let test = test_app(|_| {});
        let response = send(
            &test,
            "POST",
            "/v1/chat",
            Some(serde_json::json!({ "query": "hi", "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.error.kind, ErrorKind::InvalidArgument);
        assert!(test.store.load("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chat_rejects_malformed_json() {
        let test = test_app(|_| {});
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = test.router().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stream_uses_chunk_type_as_event_name() {
        let test = test_app(|_| {});
        let response = send(
            &test,
            "POST",
            "/v1/chat/stream",
            Some(chat_body("What's the weather in Boston?")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: status"));
        assert!(text.contains("event: content"));
        assert!(text.contains("event: complete"));
        assert!(!text.contains("event: error"));
    }

    #[tokio::test]
    async fn guard_appends_terminal_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamChunk::status("Routing request", None)).await.unwrap();
        drop(tx);

        let chunks: Vec<StreamChunk> = with_terminal_guard(rx, "c1".into()).collect().await;
        assert_eq!(chunks.len(), 2);
        let last = &chunks[1];
        assert_eq!(last.kind, ChunkKind::Error);
        assert_eq!(last.error_kind, Some(ErrorKind::StoreUnavailable));
        assert_eq!(last.conversation_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn guard_passes_terminal_streams_through() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamChunk::complete("done", "chat", TaskStatus::Completed))
            .await
            .unwrap();
        drop(tx);

        let chunks: Vec<StreamChunk> = with_terminal_guard(rx, "c1".into()).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Complete);
    }

    #[tokio::test]
    async fn permission_flow_over_http() {
        let test = test_app(|c| c.resume_on_resolution = false);
        let chunks = chat(&test, "search the web for rust tutorials").await;
        let last = chunks.last().unwrap();
        assert_eq!(last.kind, ChunkKind::Complete);
        assert_eq!(last.task_status, Some(TaskStatus::PermissionRequired));
        let op = last.pending_operation.clone().unwrap();
        assert_eq!(op.capability_required, Capability::NetworkFetch);

        let response = send(&test, "GET", "/v1/conversations/c1/permissions", None).await;
        let pending: PendingListResponse = json_body(response).await;
        assert_eq!(pending.operations.len(), 1);
        assert_eq!(pending.operations[0].id, op.id);

        let uri = format!("/v1/conversations/c1/permissions/{}/approve", op.id);
        let first: PendingOperation = json_body(send(&test, "POST", &uri, None).await).await;
        let second: PendingOperation = json_body(send(&test, "POST", &uri, None).await).await;
        assert_eq!(first.status, OperationStatus::Approved);
        assert_eq!(first, second);

        let response = send(&test, "GET", "/v1/conversations/c1/permissions", None).await;
        let pending: PendingListResponse = json_body(response).await;
        assert!(pending.operations.is_empty());

        let uri = format!(
            "/v1/conversations/c1/checkpoints/{}/resume",
            op.checkpoint_id.clone().unwrap()
        );
        let body = serde_json::json!({ "decision": "approved", "capability": "network-fetch" });
        let response = send(&test, "POST", &uri, Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let outcome: serde_json::Value = json_body(response).await;
        assert_eq!(outcome["task_status"], "completed");

        let response = send(&test, "POST", &uri, Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let audit: AuditListResponse =
            json_body(send(&test, "GET", "/v1/conversations/c1/audit", None).await).await;
        assert!(!audit.entries.is_empty());
    }

    #[tokio::test]
    async fn resume_must_follow_the_recorded_decision() {
        let test = test_app(|c| c.resume_on_resolution = false);
        let chunks = chat(&test, "search the web for rust tutorials").await;
        let op = chunks.last().unwrap().pending_operation.clone().unwrap();
        let uri = format!(
            "/v1/conversations/c1/checkpoints/{}/resume",
            op.checkpoint_id.clone().unwrap()
        );
        let approved = serde_json::json!({ "decision": "approved", "capability": "network-fetch" });

        let response = send(&test, "POST", &uri, Some(approved.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let deny = format!("/v1/conversations/c1/permissions/{}/deny", op.id);
        send(&test, "POST", &deny, None).await;
        let response = send(&test, "POST", &uri, Some(approved)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let denied = serde_json::json!({ "decision": "denied", "capability": "network-fetch" });
        let response = send(&test, "POST", &uri, Some(denied)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let outcome: serde_json::Value = json_body(response).await;
        assert!(outcome["content"].as_str().unwrap().contains("won't access the web"));
    }

    #[tokio::test]
    async fn deny_unknown_operation_is_404() {
        let test = test_app(|_| {});
        chat(&test, "hello").await;

        let response = send(
            &test,
            "POST",
            "/v1/conversations/c1/permissions/nope/deny",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.error.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn conversation_management() {
        let test = test_app(|_| {});
        chat(&test, "hello there").await;

        let response = send(&test, "GET", "/v1/conversations?user_id=u1", None).await;
        let list: ConversationListResponse = json_body(response).await;
        assert_eq!(list.conversations.len(), 1);
        assert_eq!(list.conversations[0].message_count, 2);

        let response = send(&test, "GET", "/v1/conversations", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &test,
            "PATCH",
            "/v1/conversations/c1",
            Some(serde_json::json!({ "title": "Greetings", "pinned": true })),
        )
        .await;
        let state: ConversationState = json_body(response).await;
        assert_eq!(state.metadata.title.as_deref(), Some("Greetings"));
        assert!(state.metadata.pinned);

        let response = send(&test, "DELETE", "/v1/conversations/c1", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&test, "GET", "/v1/conversations/c1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&test, "DELETE", "/v1/conversations/c1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_handlers() {
        let test = test_app(|_| {});
        let response = send(&test, "GET", "/v1/handlers", None).await;
        let json: HandlerListResponse = json_body(response).await;
        assert_eq!(json.count, 5);
        let search = json
            .handlers
            .iter()
            .find(|h| h.name == "web_search_agent")
            .unwrap();
        assert_eq!(search.required_capabilities, vec![Capability::NetworkFetch]);
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        assert_eq!(status_for(ErrorKind::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::PermissionRequired), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::StoreUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::HandlerError), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
