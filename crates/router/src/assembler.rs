//! Context assembler — builds the envelope a handler receives.
//!
//! Each optional block is included only when it is relevant to this turn.
//! Transient payloads that fail to parse are dropped, never fatal: partial
//! context is preferred over a failed request.

use serde::Serialize;
use switchyard_core::context::parse_frontmatter;
use switchyard_core::intelligence::infer_topics;
use switchyard_core::{
    CachedResult, ChatRequest, ConversationState, EditorContext, Envelope, InclusionPreference,
    PersonaSettings, PipelineContext, Result,
};
use tracing::warn;

/// Why an optional block was left out of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NotSupplied,
    IgnoredByPreference,
    NotEditable,
    Malformed,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropInfo {
    pub block: &'static str,
    pub reason: DropReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What the assembler included and what it left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub included: Vec<&'static str>,
    pub dropped: Vec<DropInfo>,
}

impl AssemblyReport {
    pub fn drop_reason(&self, block: &str) -> Option<DropReason> {
        self.dropped.iter().find(|d| d.block == block).map(|d| d.reason)
    }

    fn drop(&mut self, block: &'static str, reason: DropReason) {
        self.dropped.push(DropInfo {
            block,
            reason,
            detail: None,
        });
    }

    fn drop_with(&mut self, block: &'static str, reason: DropReason, detail: String) {
        self.dropped.push(DropInfo {
            block,
            reason,
            detail: Some(detail),
        });
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    history_limit: usize,
    intelligence_limit: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(20, 8)
    }
}

impl ContextAssembler {
    pub fn new(history_limit: usize, intelligence_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            intelligence_limit,
        }
    }

    /// Build the envelope for `request` against the current conversation
    /// state. Reads only; the state is not modified.
    ///
    /// `intelligence` is the candidate set from the cache. It is filtered
    /// to entries sharing a topic with the query and capped at the
    /// configured limit, best confidence first.
    pub fn assemble(
        &self,
        request: &ChatRequest,
        state: &ConversationState,
        persona: Option<PersonaSettings>,
        intelligence: &[CachedResult],
    ) -> Result<(Envelope, AssemblyReport)> {
        request.validate()?;
        let mut report = AssemblyReport::default();

        let mut envelope = Envelope {
            query: request.query.clone(),
            user_id: request.user_id.clone(),
            conversation_id: request.conversation_id.clone(),
            session_id: request.session_id.clone(),
            agent_type: request
                .agent_type
                .clone()
                .filter(|a| !a.trim().is_empty()),
            ..Envelope::default()
        };

        if state.has_history() {
            envelope.conversation_history =
                Some(state.recent_messages(self.history_limit).to_vec());
        } else {
            report.drop("conversation_history", DropReason::Empty);
        }

        match persona {
            Some(p) => envelope.persona = Some(p),
            None => report.drop("persona", DropReason::NotSupplied),
        }

        envelope.active_editor = self.editor_block(request, &mut report);
        envelope.pipeline_context = self.pipeline_block(request, &mut report);

        let grants = &state.shared_memory.permission_grants;
        if grants.is_empty() {
            report.drop("permission_grants", DropReason::Empty);
        } else {
            envelope.permission_grants = Some(grants.clone());
        }

        let pending: Vec<_> = state.pending_operations().cloned().collect();
        if pending.is_empty() {
            report.drop("pending_operations", DropReason::Empty);
        } else {
            envelope.pending_operations = Some(pending);
        }

        match &state.shared_memory.locked_agent {
            Some(agent) => envelope.locked_agent = Some(agent.clone()),
            None => report.drop("locked_agent", DropReason::NotSupplied),
        }

        let relevant = self.relevant_intelligence(&request.query, intelligence);
        if relevant.is_empty() {
            report.drop("conversation_intelligence", DropReason::Empty);
        } else {
            envelope.conversation_intelligence = Some(relevant);
        }

        report.included = envelope.included_blocks();
        Ok((envelope, report))
    }

    fn editor_block(
        &self,
        request: &ChatRequest,
        report: &mut AssemblyReport,
    ) -> Option<EditorContext> {
        const BLOCK: &str = "active_editor";
        let Some(raw) = &request.active_editor else {
            report.drop(BLOCK, DropReason::NotSupplied);
            return None;
        };
        let mut editor: EditorContext = match serde_json::from_value(raw.clone()) {
            Ok(e) => e,
            Err(e) => {
                warn!(conversation_id = %request.conversation_id, "Dropping malformed editor context: {e}");
                report.drop_with(BLOCK, DropReason::Malformed, e.to_string());
                return None;
            }
        };
        if editor.filename.trim().is_empty() {
            warn!(conversation_id = %request.conversation_id, "Dropping editor context without a filename");
            report.drop_with(BLOCK, DropReason::Malformed, "filename is empty".into());
            return None;
        }
        if editor.editor_preference == InclusionPreference::Ignore {
            report.drop(BLOCK, DropReason::IgnoredByPreference);
            return None;
        }
        if !editor.is_editable() {
            report.drop_with(BLOCK, DropReason::NotEditable, editor.filename);
            return None;
        }
        if editor.frontmatter.is_none() {
            editor.frontmatter = parse_frontmatter(&editor.content);
        }
        Some(editor)
    }

    fn pipeline_block(
        &self,
        request: &ChatRequest,
        report: &mut AssemblyReport,
    ) -> Option<PipelineContext> {
        const BLOCK: &str = "pipeline_context";
        let Some(raw) = &request.pipeline_context else {
            report.drop(BLOCK, DropReason::NotSupplied);
            return None;
        };
        let pipeline: PipelineContext = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!(conversation_id = %request.conversation_id, "Dropping malformed pipeline context: {e}");
                report.drop_with(BLOCK, DropReason::Malformed, e.to_string());
                return None;
            }
        };
        if pipeline.pipeline_preference == InclusionPreference::Ignore {
            report.drop(BLOCK, DropReason::IgnoredByPreference);
            return None;
        }
        Some(pipeline)
    }

    fn relevant_intelligence(&self, query: &str, candidates: &[CachedResult]) -> Vec<CachedResult> {
        let topics = infer_topics(query);
        if topics.is_empty() || self.intelligence_limit == 0 {
            return Vec::new();
        }
        let mut relevant: Vec<CachedResult> = candidates
            .iter()
            .filter(|c| c.topic_overlap(&topics) > 0)
            .cloned()
            .collect();
        relevant.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        relevant.truncate(self.intelligence_limit);
        relevant
    }
}
