//! Built-in task handlers for switchyard.
//!
//! These are reference collaborators: they exercise every path of the
//! dispatch contract (plain completion, static capability gating, internal
//! suspension, conversation locking, collaboration hints) with
//! deterministic, offline business logic.

pub mod chat;
pub mod document_writer;
pub mod wargaming;
pub mod weather;
pub mod web_search;

use std::sync::Arc;
use switchyard_config::HandlersConfig;
use switchyard_core::HandlerRegistry;

pub use chat::ChatHandler;
pub use document_writer::DocumentWriterHandler;
pub use wargaming::WargamingHandler;
pub use weather::WeatherHandler;
pub use web_search::WebSearchHandler;

/// Registry of the enabled built-in handlers.
pub fn default_registry(config: &HandlersConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let candidates: Vec<Arc<dyn switchyard_core::Handler>> = vec![
        Arc::new(ChatHandler),
        Arc::new(WeatherHandler),
        Arc::new(WebSearchHandler),
        Arc::new(WargamingHandler),
        Arc::new(DocumentWriterHandler::new(&config.workspace_dir)),
    ];
    for handler in candidates {
        if config.is_enabled(handler.name()) {
            registry.register(handler);
        }
    }
    registry
}
