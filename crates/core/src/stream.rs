//! Streamed response chunks and the sink handlers write them into.
//!
//! One turn produces, in generation order:
//! - `status`   — progress notes from the router
//! - `content`  — partial output from the handler
//! - `complete` — terminal; carries `task_status` (and a pending operation
//!   when approval is required)
//! - `error`    — terminal; carries a machine-readable `error_kind`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::error::ErrorKind;
use crate::permission::PendingOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Status,
    Content,
    Complete,
    Error,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Content => "content",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// Outcome attached to a `complete` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    PermissionRequired,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub message: String,
    #[serde(default)]
    pub producing_handler: Option<String>,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<TaskStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_operation: Option<PendingOperation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl StreamChunk {
    fn base(kind: ChunkKind, message: impl Into<String>, handler: Option<&str>) -> Self {
        Self {
            kind,
            message: message.into(),
            producing_handler: handler.map(str::to_string),
            timestamp: Utc::now(),
            conversation_id: None,
            task_status: None,
            pending_operation: None,
            error_kind: None,
        }
    }

    pub fn status(message: impl Into<String>, handler: Option<&str>) -> Self {
        Self::base(ChunkKind::Status, message, handler)
    }

    pub fn content(message: impl Into<String>, handler: &str) -> Self {
        Self::base(ChunkKind::Content, message, Some(handler))
    }

    pub fn complete(message: impl Into<String>, handler: &str, task_status: TaskStatus) -> Self {
        let mut chunk = Self::base(ChunkKind::Complete, message, Some(handler));
        chunk.task_status = Some(task_status);
        chunk
    }

    /// `complete` with `task_status = permission_required` and the operation.
    pub fn permission_required(operation: PendingOperation, handler: &str) -> Self {
        let mut chunk = Self::complete(
            operation.summary.clone(),
            handler,
            TaskStatus::PermissionRequired,
        );
        chunk.pending_operation = Some(operation);
        chunk
    }

    pub fn error(message: impl Into<String>, kind: ErrorKind, handler: Option<&str>) -> Self {
        let mut chunk = Self::base(ChunkKind::Error, message, handler);
        chunk.error_kind = Some(kind);
        chunk
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// SSE event name for this chunk.
    pub fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ChunkKind::Complete | ChunkKind::Error)
    }
}

/// Ordered chunk output for one turn.
///
/// Content written through [`ChunkSink::content`] is also recorded so the
/// router can persist partial output if the handler later fails. A detached
/// sink (no receiver) still records content.
#[derive(Clone)]
pub struct ChunkSink {
    tx: Option<mpsc::Sender<StreamChunk>>,
    emitted: Arc<Mutex<String>>,
}

impl ChunkSink {
    pub fn new(tx: mpsc::Sender<StreamChunk>) -> Self {
        Self {
            tx: Some(tx),
            emitted: Arc::new(Mutex::new(String::new())),
        }
    }

    /// A sink with no receiver, used for background resumption.
    pub fn detached() -> Self {
        Self {
            tx: None,
            emitted: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Send a chunk. Returns `false` if the receiver has gone away.
    pub async fn send(&self, chunk: StreamChunk) -> bool {
        match &self.tx {
            Some(tx) => tx.send(chunk).await.is_ok(),
            None => true,
        }
    }

    /// Record and send a `content` chunk.
    pub async fn content(&self, handler: &str, text: impl Into<String>) -> bool {
        let text = text.into();
        self.emitted.lock().await.push_str(&text);
        self.send(StreamChunk::content(text, handler)).await
    }

    /// All content emitted so far.
    pub async fn emitted(&self) -> String {
        self.emitted.lock().await.clone()
    }

    /// Resolves once the receiver is dropped. Never resolves when detached.
    pub async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }
}
