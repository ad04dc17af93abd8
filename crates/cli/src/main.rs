//! switchyard CLI — the main entry point.
//!
//! Commands:
//! - `onboard`        — Initialize config & workspace
//! - `serve`          — Start the HTTP gateway
//! - `chat`           — Interactive or single-message chat through the router
//! - `permissions`    — List, approve or deny pending operations
//! - `conversations`  — List, show or delete conversations
//! - `config`         — Show, validate or locate the configuration
//! - `doctor`         — Diagnose system health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "switchyard — multi-agent orchestration with human-in-the-loop permissions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.switchyard/config.toml)
    #[arg(short, long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat through the router
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// User the turns belong to
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Route to this handler instead of classifying
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Manage pending permission requests
    Permissions {
        #[command(subcommand)]
        action: commands::permissions::PermissionsAction,
    },

    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: commands::conversations::ConversationsAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

fn init_tracing(verbose: bool, json: bool, default_level: &str) {
    let filter = if verbose { "debug" } else { default_level };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The server logs its activity; interactive commands stay quiet.
    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    init_tracing(cli.verbose, cli.log_json, default_level);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Serve { port, host } => commands::serve::run(config_path, port, host).await?,
        Commands::Chat {
            message,
            user,
            conversation,
            agent,
        } => {
            commands::chat::run(
                config_path,
                commands::chat::ChatOptions {
                    message,
                    user,
                    conversation,
                    agent,
                },
            )
            .await?
        }
        Commands::Permissions { action } => commands::permissions::run(config_path, action).await?,
        Commands::Conversations { action } => {
            commands::conversations::run(config_path, action).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
