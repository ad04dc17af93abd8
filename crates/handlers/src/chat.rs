//! Default conversational handler.
//!
//! Receives ties, low-confidence classifications and classifier outages, so
//! it never needs a capability and never fails.

use async_trait::async_trait;
use switchyard_core::error::HandlerError;
use switchyard_core::{Envelope, Handler, HandlerContext, HandlerOutcome, HandlerReply, Role};

pub struct ChatHandler;

const GREETINGS: &[&str] = &["hi", "hello", "hey", "howdy", "greetings"];

fn is_greeting(query: &str) -> bool {
    let first = query
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .map(|w| w.to_lowercase());
    first.is_some_and(|w| GREETINGS.contains(&w.as_str()))
}

impl ChatHandler {
    fn compose(envelope: &Envelope) -> String {
        let mut parts = Vec::new();
        let name = envelope.persona.as_ref().and_then(|p| p.name.as_deref());
        let formal = envelope
            .persona
            .as_ref()
            .and_then(|p| p.tone.as_deref())
            .is_some_and(|t| t.eq_ignore_ascii_case("formal"));

        if is_greeting(&envelope.query) {
            parts.push(match (name, formal) {
                (Some(n), true) => format!("Good day, {n}. How may I assist you?"),
                (Some(n), false) => format!("Hi {n}! What can I do for you?"),
                (None, true) => "Good day. How may I assist you?".to_string(),
                (None, false) => "Hi! What can I do for you?".to_string(),
            });
        } else {
            let turns = envelope
                .conversation_history
                .as_ref()
                .map_or(0, |h| h.iter().filter(|m| m.role == Role::User).count());
            if turns == 0 {
                parts.push(format!("Let's talk about \"{}\".", envelope.query.trim()));
            } else {
                parts.push(format!(
                    "Continuing our conversation: \"{}\".",
                    envelope.query.trim()
                ));
            }
        }

        if let Some(editor) = &envelope.active_editor {
            parts.push(format!("I can see you're working on {}.", editor.filename));
        }
        if let Some(pipeline) = &envelope.pipeline_context {
            parts.push(format!("This is part of the \"{}\" pipeline.", pipeline.name));
        }
        if let Some(intel) = envelope.conversation_intelligence.as_ref().and_then(|i| i.first()) {
            parts.push(format!(
                "Earlier, {} found something related to this.",
                intel.producing_agent
            ));
        }
        if let Some(pending) = &envelope.pending_operations {
            parts.push(format!(
                "You still have {} request(s) waiting for your approval.",
                pending.len()
            ));
        }
        parts.join(" ")
    }
}

#[async_trait]
impl Handler for ChatHandler {
    fn name(&self) -> &str {
        "chat"
    }

    fn description(&self) -> &str {
        "General conversation and anything no specialist handles."
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let content = Self::compose(envelope);
        ctx.emit(self.name(), content.clone()).await;
        Ok(HandlerOutcome::Completed(HandlerReply::text(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ctx, envelope};
    use switchyard_core::{Capability, EditorContext, PendingOperation, PersonaSettings};

    fn reply(outcome: HandlerOutcome) -> String {
        match outcome {
            HandlerOutcome::Completed(r) => r.content,
            other => panic!("Expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn greets_with_persona_name() {
        let mut env = envelope("hello there");
        env.persona = Some(PersonaSettings {
            user_id: "u1".into(),
            name: Some("Ada".into()),
            tone: Some("formal".into()),
            ..PersonaSettings::default()
        });
        let out = reply(ChatHandler.invoke(&env, &ctx()).await.unwrap());
        assert_eq!(out, "Good day, Ada. How may I assist you?");
    }

    #[tokio::test]
    async fn mentions_editor_and_pending() {
        let mut env = envelope("tell me a joke");
        env.active_editor = Some(EditorContext::new("notes.md", "# Notes"));
        env.pending_operations = Some(vec![PendingOperation::new(
            "web_search",
            "Search",
            Capability::NetworkFetch,
            "web_search_agent",
        )]);
        let out = reply(ChatHandler.invoke(&env, &ctx()).await.unwrap());
        assert!(out.contains("notes.md"));
        assert!(out.contains("1 request(s)"));
    }

    #[tokio::test]
    async fn streams_its_reply() {
        let ctx = ctx();
        ChatHandler.invoke(&envelope("hi"), &ctx).await.unwrap();
        assert_eq!(ctx.sink.emitted().await, "Hi! What can I do for you?");
    }

    #[test]
    fn greeting_detection() {
        assert!(is_greeting("Hey, you there?"));
        assert!(!is_greeting("they said hi"));
        assert!(!is_greeting(""));
    }
}
