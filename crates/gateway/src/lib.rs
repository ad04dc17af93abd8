//! HTTP transport for switchyard.
//!
//! Exposes the router's RPC surface: streamed chat over SSE and WebSocket,
//! unary permission calls, conversation management, the domain event feed
//! and a HealthCheck.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header, request},
    response::{IntoResponse, Json},
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use switchyard_config::AppConfig;
use switchyard_core::EventBus;
use switchyard_handlers::default_registry;
use switchyard_router::Router as Orchestrator;
use switchyard_store::InMemoryIntelligenceCache;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub router: Arc<Orchestrator>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(router: Arc<Orchestrator>) -> Self {
        Self {
            router,
            started_at: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full HTTP router.
///
/// Layers applied:
/// - CORS limited to localhost origins
/// - Request body size limit (`gateway.max_body_bytes`)
/// - HTTP trace logging
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _: &request::Parts| {
            let origin = origin.as_bytes();
            origin.starts_with(b"http://localhost") || origin.starts_with(b"http://127.0.0.1")
        }))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire a router from configuration: store backend, built-in handlers,
/// configured classifier and an in-memory intelligence cache.
pub async fn build_orchestrator(
    config: &AppConfig,
) -> Result<Arc<Orchestrator>, Box<dyn std::error::Error>> {
    let stores = switchyard_store::open_from_config(config).await?;
    let registry = default_registry(&config.handlers);
    let classifier = switchyard_classifier::build_from_config(config, &registry.infos())?;

    let router = Orchestrator::new(
        config.router.clone(),
        registry,
        stores.conversations,
        stores.personas,
        Arc::new(InMemoryIntelligenceCache::new()),
        classifier,
    )
    .with_event_bus(Arc::new(EventBus::default()))
    .with_stream_buffer(config.gateway.stream_buffer);

    Ok(Arc::new(router))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = build_orchestrator(&config).await?;
    let handler_count = router.handlers().len();
    let app = build_router(
        Arc::new(GatewayState::new(router)),
        config.gateway.max_body_bytes,
    );

    info!(addr = %addr, handlers = handler_count, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

// --- Handlers ---

/// `GET /health` — HealthCheck. 503 when the conversation store is down.
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let report = state.router.health().await;
    let status = if report.status == "unavailable" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds().max(0);

    (
        status,
        Json(serde_json::json!({
            "status": report.status,
            "version": report.version,
            "dependencies": report.dependencies,
            "handlers": report.handlers,
            "uptime_secs": uptime_secs,
        })),
    )
}
