//! `switchyard onboard` — First-time setup.

use std::path::Path;

use switchyard_config::AppConfig;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_file(config_path);
    let workspace_dir = AppConfig::workspace_dir();

    println!("🚦 switchyard — First-Time Setup");
    println!("================================\n");

    if let Some(config_dir) = config_path.parent() {
        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
            println!("✅ Created config directory: {}", config_dir.display());
        } else {
            println!("  Config directory exists: {}", config_dir.display());
        }
    }

    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("✅ Created workspace directory: {}", workspace_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Review the keyword rules in {}", config_path.display());
        println!("   2. Run: switchyard chat");
        println!("   3. Or serve the HTTP API: switchyard serve\n");
    }

    println!("🎉 Setup complete!\n");

    Ok(())
}
