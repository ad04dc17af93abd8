//! `switchyard serve` — Start the HTTP gateway.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;

    println!("🚦 switchyard gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:      {:?} ({})", config.store.backend, config.store.path);
    println!("   Classifier: {:?}", config.classifier.backend);

    switchyard_gateway::start(config).await?;

    Ok(())
}
