//! Document writer — drafts text and saves it to the workspace.
//!
//! Drafting needs no capability. Saving does: without a `file-write` grant
//! the handler streams the draft and suspends, and the draft is written
//! only when the suspension is resumed with an approval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchyard_core::error::HandlerError;
use switchyard_core::{
    CachedKind, Capability, Checkpoint, Envelope, Handler, HandlerContext, HandlerOutcome,
    HandlerReply, ResumeSignal, Suspension,
};
use tracing::info;

const DRAFT_PREFIXES: &[&str] = &["write", "draft", "create", "compose"];

pub struct DocumentWriterHandler {
    workspace_dir: PathBuf,
}

/// Progress carried through a `file_write` suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DraftProgress {
    filename: String,
    draft: String,
}

impl DocumentWriterHandler {
    pub fn new(workspace_dir: impl AsRef<Path>) -> Self {
        Self {
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
        }
    }

    /// Resolve a file name inside the workspace. Directory components are
    /// dropped so a draft can never be written outside it.
    fn target_path(&self, filename: &str) -> Result<PathBuf, HandlerError> {
        let base = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.starts_with('.'))
            .ok_or_else(|| HandlerError::InvalidInput(format!("Invalid file name: {filename}")))?;
        Ok(self.workspace_dir.join(base))
    }

    async fn save(&self, progress: &DraftProgress) -> Result<PathBuf, HandlerError> {
        let path = self.target_path(&progress.filename)?;
        let failed = |e: std::io::Error| HandlerError::ExecutionFailed {
            handler: "document_writer".into(),
            reason: format!("Failed to write {}: {e}", path.display()),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }
        tokio::fs::write(&path, &progress.draft)
            .await
            .map_err(failed)?;
        info!(path = %path.display(), bytes = progress.draft.len(), "Draft saved");
        Ok(path)
    }
}

fn subject(query: &str) -> String {
    let trimmed = query.trim().trim_end_matches(['.', '!', '?']);
    let mut words: Vec<&str> = trimmed.split_whitespace().collect();
    if words
        .first()
        .is_some_and(|w| DRAFT_PREFIXES.contains(&w.to_lowercase().as_str()))
    {
        words.remove(0);
        if words
            .first()
            .is_some_and(|w| matches!(w.to_lowercase().as_str(), "a" | "an" | "the"))
        {
            words.remove(0);
        }
    }
    if words.is_empty() {
        "untitled".to_string()
    } else {
        words.join(" ")
    }
}

fn slug(text: &str) -> String {
    let slug = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { "draft".into() } else { slug }
}

fn compose(envelope: &Envelope) -> DraftProgress {
    let subject = subject(&envelope.query);

    let editor = envelope.active_editor.as_ref().filter(|e| e.is_editable());
    let filename = editor
        .map(|e| e.filename.clone())
        .unwrap_or_else(|| format!("{}.md", slug(&subject)));

    let mut draft = match editor {
        Some(e) if !e.content.trim().is_empty() => {
            format!("{}\n\n## {subject}\n\n", e.content.trim_end())
        }
        _ => format!("# {subject}\n\n"),
    };
    draft.push_str(&format!(
        "This draft covers {subject}. It sets out the context, the key points and a short conclusion.\n"
    ));

    let sources: Vec<String> = envelope
        .conversation_intelligence
        .iter()
        .flatten()
        .filter(|e| e.kind == CachedKind::SearchResults)
        .filter_map(|e| e.payload.get("results")?.as_array().cloned())
        .flatten()
        .filter_map(|r| {
            let title = r.get("title")?.as_str()?;
            let url = r.get("url")?.as_str()?;
            Some(format!("- [{title}]({url})"))
        })
        .collect();
    if !sources.is_empty() {
        draft.push_str("\n### Sources\n\n");
        draft.push_str(&sources.join("\n"));
        draft.push('\n');
    }

    DraftProgress { filename, draft }
}

#[async_trait]
impl Handler for DocumentWriterHandler {
    fn name(&self) -> &str {
        "document_writer"
    }

    fn description(&self) -> &str {
        "Drafts documents and saves them to the workspace once file writes are approved."
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let progress = compose(envelope);
        ctx.emit(self.name(), progress.draft.clone()).await;

        if envelope.has_capability(Capability::FileWrite) {
            let path = self.save(&progress).await?;
            return Ok(HandlerOutcome::Completed(HandlerReply::text(format!(
                "{}\nSaved to {}.",
                progress.draft,
                path.display()
            ))));
        }

        Ok(HandlerOutcome::Suspended(Suspension {
            kind: "file_write".into(),
            summary: format!("Save draft to {}", progress.filename),
            capability: Capability::FileWrite,
            progress: serde_json::to_value(&progress)
                .map_err(|e| HandlerError::InvalidInput(e.to_string()))?,
        }))
    }

    async fn resume(
        &self,
        envelope: &Envelope,
        checkpoint: &Checkpoint,
        signal: ResumeSignal,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let progress: DraftProgress = serde_json::from_value(checkpoint.progress.clone())
            .unwrap_or_else(|_| compose(envelope));

        match signal {
            ResumeSignal::Approved(_) => {
                let path = self.save(&progress).await?;
                let content = format!("Saved {} to {}.", progress.filename, path.display());
                ctx.emit(self.name(), content.clone()).await;
                Ok(HandlerOutcome::Completed(HandlerReply::text(content)))
            }
            ResumeSignal::Denied(_) => {
                let content = format!(
                    "Understood, I didn't save {}. Here is the draft so you can keep it:\n\n{}",
                    progress.filename, progress.draft
                );
                ctx.emit(self.name(), content.clone()).await;
                Ok(HandlerOutcome::Completed(HandlerReply::text(content)))
            }
        }
    }
}
