//! `switchyard config` — Configuration management commands.

use std::path::Path;

use switchyard_config::{AppConfig, ClassifierBackend};

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_file(config_path);
    println!("🔍 Validating {}...", path.display());

    let config = match AppConfig::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if config.classifier.backend != ClassifierBackend::Keyword && config.classifier.api_key.is_none()
    {
        warnings.push("LLM classifier has no API key (set SWITCHYARD_API_KEY)".to_string());
    }
    if config.classifier.rules.is_empty() {
        warnings.push("No keyword rules; every turn goes to the default handler".to_string());
    }
    for handler in &config.handlers.enabled {
        if !config.classifier.rules.contains_key(handler) && *handler != config.router.default_handler
        {
            warnings.push(format!("Handler {handler} has no keyword rule"));
        }
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Gateway:     {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:       {:?} ({})", config.store.backend, config.store.path);
    println!("   Classifier:  {:?}", config.classifier.backend);
    println!("   Default:     {}", config.router.default_handler);
    println!("   Personas:    {}", config.personas.len());

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = redacted(super::load_config(config_path)?);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_file(config_path).display());
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    if config.classifier.api_key.is_some() {
        config.classifier.api_key = Some("***".into());
    }
    config
}
