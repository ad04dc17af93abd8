//! Intent classifier trait — a best-effort, possibly unavailable dependency.
//!
//! The router never fails a turn because classification failed; it falls
//! back to the default handler instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::error::ClassifierError;

/// A `(handler_name, confidence, reasoning)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub handler: String,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    pub reasoning: String,
}

impl Classification {
    pub fn new(handler: impl Into<String>, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        }
    }
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Human-readable classifier name (for logs and health reports).
    fn name(&self) -> &str;

    /// Classify a query given the recent history, oldest first.
    async fn classify(
        &self,
        query: &str,
        recent_history: &[Message],
    ) -> std::result::Result<Classification, ClassifierError>;

    /// Check whether the classifier's upstream is reachable.
    async fn health_check(&self) -> std::result::Result<(), ClassifierError> {
        Ok(())
    }
}
