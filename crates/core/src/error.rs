//! Error types for the switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and every error maps to
//! exactly one machine-readable [`ErrorKind`] for the transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Classifier errors ---
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    // --- Handler errors ---
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    // --- Permission errors ---
    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Deadline exceeded after {timeout_ms}ms: {operation}")]
    DeadlineExceeded { operation: String, timeout_ms: u64 },

    #[error("Turn cancelled by caller")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The machine-readable kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Store(StoreError::CheckpointNotFound { .. }) => ErrorKind::NotFound,
            Error::Store(StoreError::CheckpointConsumed { .. }) => ErrorKind::InvalidArgument,
            Error::Store(_) => ErrorKind::StoreUnavailable,
            Error::Classifier(_) => ErrorKind::ClassifierUnavailable,
            Error::Handler(HandlerError::Timeout { .. }) => ErrorKind::DeadlineExceeded,
            Error::Handler(HandlerError::NotFound(_)) => ErrorKind::NotFound,
            Error::Handler(_) => ErrorKind::HandlerError,
            Error::Permission(PermissionError::NotFound { .. }) => ErrorKind::NotFound,
            Error::Permission(PermissionError::Required { .. }) => ErrorKind::PermissionRequired,
            Error::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Cache(_) | Error::Config { .. } | Error::Serialization(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Machine-readable error taxonomy carried on `error` chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    PermissionRequired,
    HandlerError,
    ClassifierUnavailable,
    #[serde(rename = "unavailable")]
    StoreUnavailable,
    DeadlineExceeded,
    Cancelled,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::PermissionRequired => "permission_required",
            ErrorKind::HandlerError => "handler_error",
            ErrorKind::ClassifierUnavailable => "classifier_unavailable",
            ErrorKind::StoreUnavailable => "unavailable",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Checkpoint {checkpoint_id} not found in conversation {conversation_id}")]
    CheckpointNotFound {
        conversation_id: String,
        checkpoint_id: String,
    },

    #[error("Checkpoint {checkpoint_id} was already consumed")]
    CheckpointConsumed { checkpoint_id: String },
}

#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Classifier API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Classifier returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Classifier timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Classifier not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("Handler not found: {0}")]
    NotFound(String),

    #[error("Handler {handler} failed: {reason}")]
    ExecutionFailed { handler: String, reason: String },

    #[error("Handler {handler} timed out after {timeout_ms}ms")]
    Timeout { handler: String, timeout_ms: u64 },

    #[error("Invalid handler input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Error)]
pub enum PermissionError {
    #[error("Operation {operation_id} not found in conversation {conversation_id}")]
    NotFound {
        conversation_id: String,
        operation_id: String,
    },

    #[error("Capability {capability} required by {handler}")]
    Required { handler: String, capability: String },
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(String),
}
