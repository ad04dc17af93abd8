//! `switchyard doctor` — Diagnose system health.

use std::path::Path;

use switchyard_config::{AppConfig, StoreBackend};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 switchyard doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let path = super::config_file(config_path);
    let config = if path.exists() {
        match AppConfig::load_with_env(&path) {
            Ok(config) => {
                println!("  ✅ Config file valid");
                config
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                println!("\n  ⚠️  Fix the config and run doctor again.");
                return Ok(());
            }
        }
    } else {
        println!("  ⚠️  No config file, using defaults (run `switchyard onboard`)");
        issues += 1;
        AppConfig::default()
    };

    let workspace = Path::new(&config.handlers.workspace_dir);
    if workspace.is_dir() {
        println!("  ✅ Workspace directory exists");
    } else {
        println!(
            "  ⚠️  No workspace directory at {} (run `switchyard onboard`)",
            workspace.display()
        );
        issues += 1;
    }

    if config.store.backend == StoreBackend::Memory {
        println!("  ⚠️  In-memory store: conversations are lost on exit");
        issues += 1;
    }

    let mut config = config;
    config.router.resume_on_resolution = false;
    match switchyard_gateway::build_orchestrator(&config).await {
        Ok(router) => {
            let report = router.health().await;
            for (name, dependency) in &report.dependencies {
                match &dependency.detail {
                    None => println!("  ✅ {name}"),
                    Some(detail) => {
                        println!("  ❌ {name}: {detail}");
                        issues += 1;
                    }
                }
            }
            println!("  ✅ {} handler(s) registered", report.handlers);
        }
        Err(e) => {
            println!("  ❌ Router could not start: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
