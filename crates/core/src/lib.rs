//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the switchyard
//! orchestration tier. This crate has **zero framework dependencies**: it
//! defines the conversation model and the collaborator contracts that every
//! other crate implements against.
//!
//! ## Collaborators
//!
//! Each external collaborator of the router is a trait here:
//! - [`Handler`] — a task handler ("agent") with static capability needs
//! - [`ConversationStore`] / [`PersonaStore`] — durable conversation state
//! - [`IntelligenceCache`] — conversation-scoped, content-addressed results
//! - [`IntentClassifier`] — best-effort intent classification
//!
//! Implementations live in their respective crates.

pub mod classifier;
pub mod context;
pub mod conversation;
pub mod error;
pub mod event;
pub mod handler;
pub mod intelligence;
pub mod permission;
pub mod routing;
pub mod store;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use classifier::{Classification, IntentClassifier};
pub use context::{
    ChatRequest, EditorContext, Envelope, InclusionPreference, PersonaSettings, PipelineContext,
};
pub use conversation::{
    ConversationMetadata, ConversationState, ConversationSummary, ErrorState, Message, Role,
    SharedMemory,
};
pub use error::{Error, ErrorKind, Result};
pub use event::{DomainEvent, EventBus};
pub use handler::{
    Handler, HandlerContext, HandlerInfo, HandlerOutcome, HandlerRegistry, HandlerReply,
    ResumeSignal, StateSignal, Suspension,
};
pub use intelligence::{CachedKind, CachedResult, IntelligenceCache};
pub use permission::{Capability, OperationStatus, PendingOperation, PermissionGrants};
pub use routing::{RoutingDecision, RoutingReason};
pub use store::{Checkpoint, ConversationStore, PersonaStore};
pub use stream::{ChunkKind, ChunkSink, StreamChunk, TaskStatus};
