//! Routing decisions — which handler a turn goes to, and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the target handler was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    /// Conversation is locked to a handler
    Locked,
    /// Caller supplied `agent_type`
    Explicit,
    /// Intent classifier result above the confidence floor
    Classified,
    /// A handler left a suggestion in the intelligence cache
    Suggested,
    /// Low confidence, tie, unknown handler, or classifier failure
    Fallback,
}

impl RoutingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingReason::Locked => "locked",
            RoutingReason::Explicit => "explicit",
            RoutingReason::Classified => "classified",
            RoutingReason::Suggested => "suggested",
            RoutingReason::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved target for one turn. Recorded into the conversation for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub handler: String,
    pub reason: RoutingReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl RoutingDecision {
    pub fn new(handler: impl Into<String>, reason: RoutingReason) -> Self {
        Self {
            handler: handler.into(),
            reason,
            confidence: None,
            reasoning: None,
            decided_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}
