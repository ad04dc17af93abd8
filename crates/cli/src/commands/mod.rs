pub mod chat;
pub mod config_cmd;
pub mod conversations;
pub mod doctor;
pub mod onboard;
pub mod permissions;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use switchyard_config::AppConfig;
use switchyard_core::PendingOperation;
use switchyard_router::Router;

/// The config file in use: `--config`, or the default location.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with_env(&config_file(path))
        .map_err(|e| format!("Failed to load config: {e}").into())
}

/// A router for one-shot commands. Resumes run in the foreground so the
/// process does not exit before a resumed handler finishes.
pub async fn local_router(
    path: Option<&Path>,
) -> Result<Arc<Router>, Box<dyn std::error::Error>> {
    let mut config = load_config(path)?;
    config.router.resume_on_resolution = false;
    tracing::debug!(store = ?config.store.backend, classifier = ?config.classifier.backend, "Building local router");
    switchyard_gateway::build_orchestrator(&config).await
}

pub fn print_operation(op: &PendingOperation) {
    println!("  🔐 {} [{}]", op.summary, op.capability_required);
    println!("     id:      {}", op.id);
    println!("     handler: {}", op.handler);
    println!("     status:  {:?}", op.status);
}
