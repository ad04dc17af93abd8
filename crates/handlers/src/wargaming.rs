//! Turn-based wargaming simulation.
//!
//! Locks the conversation to itself on every turn so follow-ups stay in the
//! simulation, and releases the lock when the user ends it.

use async_trait::async_trait;
use switchyard_core::error::HandlerError;
use switchyard_core::{
    Envelope, Handler, HandlerContext, HandlerOutcome, HandlerReply, Role, StateSignal,
};

const EXIT_PHRASES: &[&str] = &["end simulation", "end the simulation", "stop", "exit", "quit"];

const PHASES: &[&str] = &[
    "Reconnaissance reports enemy columns massing along the northern ridge.",
    "Your forward units make contact. Artillery support is available for one strike.",
    "The enemy flanks east through the river valley. Reserves are thin.",
    "Supply lines are stretched. Weather is closing in over the pass.",
    "Both sides are exhausted. A decisive push could end the campaign.",
];

pub struct WargamingHandler;

fn wants_exit(query: &str) -> bool {
    let q = query.to_lowercase();
    EXIT_PHRASES.iter().any(|p| {
        if p.contains(' ') {
            q.contains(p)
        } else {
            q.split(|c: char| !c.is_alphanumeric()).any(|w| w == *p)
        }
    })
}

/// How many turns of this simulation have already been played.
fn turns_played(envelope: &Envelope, name: &str) -> usize {
    envelope.conversation_history.as_ref().map_or(0, |h| {
        h.iter()
            .filter(|m| m.role == Role::Assistant && m.handler.as_deref() == Some(name))
            .count()
    })
}

#[async_trait]
impl Handler for WargamingHandler {
    fn name(&self) -> &str {
        "wargaming_agent"
    }

    fn description(&self) -> &str {
        "Runs an interactive, multi-turn wargaming simulation."
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        if wants_exit(&envelope.query) {
            let content = "Simulation ended. Returning you to general conversation.".to_string();
            ctx.emit(self.name(), content.clone()).await;
            return Ok(HandlerOutcome::Completed(
                HandlerReply::text(content).with_signal(StateSignal::UnlockAgent),
            ));
        }

        let turn = turns_played(envelope, self.name());
        let phase = PHASES[turn % PHASES.len()];
        let content = if turn == 0 {
            format!(
                "Simulation started. Turn 1: {phase} Your orders, commander? (say \"end simulation\" to stop)"
            )
        } else {
            format!(
                "Orders received: \"{}\". Turn {}: {phase} Your orders?",
                envelope.query.trim(),
                turn + 1
            )
        };
        ctx.emit(self.name(), content.clone()).await;
        Ok(HandlerOutcome::Completed(
            HandlerReply::text(content)
                .with_signal(StateSignal::LockAgent(self.name().to_string())),
        ))
    }
}
