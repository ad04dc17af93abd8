//! `switchyard chat` — Interactive or single-message chat through the router.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use switchyard_core::{ChatRequest, ChunkKind, PendingOperation};
use switchyard_router::Router;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::permissions::{print_outcome, resolve_and_resume};

pub struct ChatOptions {
    pub message: Option<String>,
    pub user: String,
    pub conversation: Option<String>,
    pub agent: Option<String>,
}

/// One CLI chat session against a single conversation.
struct Session {
    router: Arc<Router>,
    user: String,
    conversation_id: String,
    session_id: String,
    agent: Option<String>,
    unlock_next: bool,
    last_pending: Option<PendingOperation>,
}

impl Session {
    async fn send(&mut self, query: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut request = ChatRequest::new(
            query,
            self.user.as_str(),
            self.conversation_id.as_str(),
            self.session_id.as_str(),
        );
        request.agent_type = self.agent.clone();
        request.unlock_agent = std::mem::take(&mut self.unlock_next);

        let mut rx = self.router.stream_chat(request)?;
        let mut saw_content = false;

        while let Some(chunk) = rx.recv().await {
            let handler = chunk.producing_handler.as_deref().unwrap_or("assistant");
            match chunk.kind {
                ChunkKind::Status => eprintln!("  … {}", chunk.message),
                ChunkKind::Content => {
                    saw_content = true;
                    print_reply(handler, &chunk.message);
                }
                ChunkKind::Complete => {
                    if let Some(op) = chunk.pending_operation {
                        print_approval_box(&op);
                        self.last_pending = Some(op);
                    } else if !saw_content {
                        print_reply(handler, &chunk.message);
                    }
                }
                ChunkKind::Error => {
                    let kind = chunk
                        .error_kind
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| "error".into());
                    eprintln!("  [{kind}] {}", chunk.message);
                }
            }
        }
        Ok(())
    }

    async fn resolve(
        &mut self,
        operation_id: Option<&str>,
        approve: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let operation_id = match operation_id {
            Some(id) => id.to_string(),
            None => match &self.last_pending {
                Some(op) => op.id.clone(),
                None => {
                    println!("  Nothing is waiting for approval.");
                    return Ok(());
                }
            },
        };

        let (op, outcome) = resolve_and_resume(
            &self.router,
            &self.conversation_id,
            &operation_id,
            approve,
        )
        .await?;
        if self.last_pending.as_ref().is_some_and(|p| p.id == op.id) {
            self.last_pending = None;
        }

        let verb = if approve { "✅ Approved" } else { "❌ Denied" };
        println!("  {verb}: {}", op.summary);
        print_outcome(outcome.as_ref());
        if let Some(next) = outcome.and_then(|o| o.pending_operation) {
            self.last_pending = Some(next);
        }
        Ok(())
    }

    async fn show_pending(&self) -> Result<(), Box<dyn std::error::Error>> {
        let pending = self.router.get_pending(&self.conversation_id).await?;
        if pending.is_empty() {
            println!("  Nothing is waiting for approval.");
        }
        for op in &pending {
            super::print_operation(op);
        }
        Ok(())
    }

    /// Handle a `/command`. Returns `false` for unknown commands.
    async fn command(&mut self, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let arg = parts.next();

        match command {
            "/approve" => self.resolve(arg, true).await?,
            "/deny" => self.resolve(arg, false).await?,
            "/pending" => self.show_pending().await?,
            "/unlock" => {
                self.unlock_next = true;
                println!("  The next message will release any locked handler.");
            }
            "/agent" => {
                self.agent = arg.map(str::to_string);
                match &self.agent {
                    Some(name) => println!("  Routing every message to {name}."),
                    None => println!("  Back to automatic routing."),
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn print_reply(handler: &str, message: &str) {
    println!();
    for line in message.lines() {
        println!("  {handler} > {line}");
    }
    println!();
}

fn print_approval_box(op: &PendingOperation) {
    println!();
    println!("  ╔══════════════════ Approval needed ══════════════════╗");
    println!("    {}", op.summary);
    println!("    capability: {}", op.capability_required);
    println!("    operation:  {}", op.id);
    println!("  ╚═════════════════════════════════════════════════════╝");
    println!("  Type /approve or /deny.");
    println!();
}

pub async fn run(
    config_path: Option<&Path>,
    options: ChatOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = super::local_router(config_path).await?;

    let mut session = Session {
        router,
        user: options.user,
        conversation_id: options
            .conversation
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        session_id: uuid::Uuid::new_v4().to_string(),
        agent: options.agent,
        unlock_next: false,
        last_pending: None,
    };

    if let Some(message) = options.message {
        session.send(&message).await?;
        if let Some(op) = &session.last_pending {
            println!(
                "  Resolve with: switchyard permissions approve {} {}",
                session.conversation_id, op.id
            );
        }
        return Ok(());
    }

    let handlers: Vec<String> = session
        .router
        .handlers()
        .into_iter()
        .map(|h| h.name)
        .collect();

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║       switchyard — Interactive Chat          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Conversation: {}", session.conversation_id);
    println!("  Handlers:     {}", handlers.join(", "));
    println!();
    println!("  Commands: /approve [id], /deny [id], /pending, /unlock, /agent [name]");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let result = if line.starts_with('/') {
            match session.command(line).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    println!("  Unknown command: {line}");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            session.send(line).await
        };
        if let Err(e) = result {
            eprintln!("  [Error] {e}");
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}
