//! Inbound requests, transient context payloads, and the outbound envelope.
//!
//! `EditorContext` and `PipelineContext` are per-request only and are never
//! persisted as part of [`ConversationState`](crate::ConversationState). They
//! arrive as raw JSON on [`ChatRequest`] so a malformed payload can be dropped
//! by the assembler without failing the whole request.

use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::error::{Error, Result};
use crate::intelligence::CachedResult;
use crate::permission::{Capability, PendingOperation, PermissionGrants};

/// File extensions treated as editable text.
const EDITABLE_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdx", "txt", "text", "rst", "org", "adoc", "tex", "csv", "json", "yaml",
    "yml", "toml", "ini", "xml", "html", "css", "rs", "py", "js", "ts", "tsx", "jsx", "go",
    "java", "c", "h", "cpp", "hpp", "rb", "sh", "sql",
];

/// Languages treated as editable text when the filename has no known extension.
const EDITABLE_LANGUAGES: &[&str] = &["markdown", "plaintext", "text", "restructuredtext", "org"];

/// Caller's preference for whether a transient block is sent onward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InclusionPreference {
    #[default]
    Auto,
    Include,
    Ignore,
}

/// An open document in the caller's editing surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorContext {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, alias = "preference")]
    pub editor_preference: InclusionPreference,
}

impl EditorContext {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            language: None,
            content: content.into(),
            frontmatter: None,
            editor_preference: InclusionPreference::Auto,
        }
    }

    pub fn with_preference(mut self, preference: InclusionPreference) -> Self {
        self.editor_preference = preference;
        self
    }

    /// Whether the open file is an editable text format.
    pub fn is_editable(&self) -> bool {
        let by_extension = std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| EDITABLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let by_language = self
            .language
            .as_deref()
            .map(|l| EDITABLE_LANGUAGES.contains(&l.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        by_extension || by_language
    }
}

/// Parse a leading `---` front-matter block of `key: value` lines.
///
/// Returns `None` when the content has no closed front-matter block.
pub fn parse_frontmatter(content: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let mut lines = content.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }
    let mut map = serde_json::Map::new();
    for line in lines {
        let line = line.trim();
        if line == "---" {
            return Some(map);
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }
    None
}

/// An active template/pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub pipeline_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default, alias = "preference")]
    pub pipeline_preference: InclusionPreference,
}

/// Per-user display and behavioural preferences. Read-only to the router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaSettings {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A raw StreamChat request as received by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub session_id: String,

    /// Explicit handler override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,

    /// Release a conversation lock before routing
    #[serde(default)]
    pub unlock_agent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_editor: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_context: Option<serde_json::Value>,

    /// Per-turn deadline overriding the configured defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl ChatRequest {
    pub fn new(
        query: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn with_editor(mut self, editor: &EditorContext) -> Self {
        self.active_editor = serde_json::to_value(editor).ok();
        self
    }

    pub fn with_pipeline(mut self, pipeline: &PipelineContext) -> Self {
        self.pipeline_context = serde_json::to_value(pipeline).ok();
        self
    }

    /// Reject requests with an empty required field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("query", &self.query),
            ("user_id", &self.user_id),
            ("conversation_id", &self.conversation_id),
            ("session_id", &self.session_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidArgument(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// The assembled, conditionally populated payload handed to a handler.
///
/// Every optional block is omitted from the wire form when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub query: String,
    pub user_id: String,
    pub conversation_id: String,
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<Message>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_editor: Option<EditorContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_context: Option<PipelineContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_grants: Option<PermissionGrants>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_operations: Option<Vec<PendingOperation>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_intelligence: Option<Vec<CachedResult>>,
}

impl Envelope {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.permission_grants
            .as_ref()
            .is_some_and(|g| g.contains(capability))
    }

    /// Names of the optional blocks present in this envelope.
    pub fn included_blocks(&self) -> Vec<&'static str> {
        let mut blocks = Vec::new();
        if self.conversation_history.is_some() {
            blocks.push("conversation_history");
        }
        if self.persona.is_some() {
            blocks.push("persona");
        }
        if self.active_editor.is_some() {
            blocks.push("active_editor");
        }
        if self.pipeline_context.is_some() {
            blocks.push("pipeline_context");
        }
        if self.permission_grants.is_some() {
            blocks.push("permission_grants");
        }
        if self.pending_operations.is_some() {
            blocks.push("pending_operations");
        }
        if self.locked_agent.is_some() {
            blocks.push("locked_agent");
        }
        if self.conversation_intelligence.is_some() {
            blocks.push("conversation_intelligence");
        }
        blocks
    }
}
