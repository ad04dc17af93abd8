//! `switchyard conversations` — Inspect and delete stored conversations.

use std::path::Path;

use clap::Subcommand;
use switchyard_core::Role;

#[derive(Subcommand)]
pub enum ConversationsAction {
    /// List a user's conversations, most recent first
    List {
        #[arg(short, long, default_value = "local")]
        user: String,
    },
    /// Print a conversation's messages and state
    Show { id: String },
    /// Delete a conversation and its checkpoints
    Delete { id: String },
}

pub async fn run(
    config_path: Option<&Path>,
    action: ConversationsAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = super::local_router(config_path).await?;

    match action {
        ConversationsAction::List { user } => {
            let conversations = router.list_conversations(&user).await?;
            if conversations.is_empty() {
                println!("  No conversations for {user}");
                return Ok(());
            }
            for summary in conversations {
                let mut flags = Vec::new();
                if summary.pinned {
                    flags.push("pinned");
                }
                if summary.archived {
                    flags.push("archived");
                }
                if summary.pending_count > 0 {
                    flags.push("awaiting approval");
                }
                println!(
                    "  {}  {}  ({} messages{}{})",
                    summary.conversation_id,
                    summary.title.as_deref().unwrap_or("(untitled)"),
                    summary.message_count,
                    if flags.is_empty() { "" } else { ", " },
                    flags.join(", "),
                );
            }
        }
        ConversationsAction::Show { id } => {
            let Some(state) = router.get_conversation(&id).await? else {
                return Err(format!("Conversation {id} not found").into());
            };
            println!("  📜 {}", state.metadata.title.as_deref().unwrap_or(&id));
            println!("     user:    {}", state.user_id);
            if let Some(agent) = &state.shared_memory.locked_agent {
                println!("     locked:  {agent}");
            }
            let grants: Vec<String> = state
                .shared_memory
                .permission_grants
                .iter()
                .map(|c| c.to_string())
                .collect();
            if !grants.is_empty() {
                println!("     grants:  {}", grants.join(", "));
            }
            println!();
            for message in &state.messages {
                let who = match message.role {
                    Role::User => "You",
                    Role::Assistant => message.handler.as_deref().unwrap_or("assistant"),
                };
                for line in message.content.lines() {
                    println!("  {who} > {line}");
                }
            }
            for op in state.pending_operations() {
                println!();
                super::print_operation(op);
            }
        }
        ConversationsAction::Delete { id } => {
            if router.delete_conversation(&id).await? {
                println!("  ✅ Deleted {id}");
            } else {
                println!("  Conversation {id} not found");
            }
        }
    }

    Ok(())
}
