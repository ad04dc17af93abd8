//! Classifier fallback — ordered chain with per-classifier timeouts.
//!
//! When a classifier fails or times out, the next one in the chain is tried.
//! The router treats a failure of the whole chain like any classifier
//! failure and routes to its default handler.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::error::ClassifierError;
use switchyard_core::{Classification, IntentClassifier, Message};
use tracing::{info, warn};

pub struct ChainClassifier {
    name: String,
    chain: Vec<ChainEntry>,
}

struct ChainEntry {
    classifier: Arc<dyn IntentClassifier>,
    timeout: Duration,
}

impl ChainClassifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Append a classifier with its own timeout.
    pub fn add(mut self, classifier: Arc<dyn IntentClassifier>, timeout: Duration) -> Self {
        self.chain.push(ChainEntry {
            classifier,
            timeout,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[async_trait]
impl IntentClassifier for ChainClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(
        &self,
        query: &str,
        recent_history: &[Message],
    ) -> Result<Classification, ClassifierError> {
        let mut last_error = ClassifierError::NotConfigured("No classifiers in chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let name = entry.classifier.name().to_string();
            match tokio::time::timeout(entry.timeout, entry.classifier.classify(query, recent_history))
                .await
            {
                Ok(Ok(classification)) => {
                    if i > 0 {
                        info!(classifier = %name, attempt = i + 1, "Chain: fallback classifier answered");
                    }
                    return Ok(classification);
                }
                Ok(Err(e)) => {
                    warn!(classifier = %name, error = %e, "Chain: classifier failed, trying next");
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        classifier = %name,
                        timeout_ms = entry.timeout.as_millis() as u64,
                        "Chain: classifier timed out, trying next"
                    );
                    last_error = ClassifierError::Timeout(entry.timeout.as_millis() as u64);
                }
            }
        }

        Err(last_error)
    }

    /// Healthy if any classifier in the chain is healthy.
    async fn health_check(&self) -> Result<(), ClassifierError> {
        let mut last_error = ClassifierError::NotConfigured("No classifiers in chain".into());
        for entry in &self.chain {
            match entry.classifier.health_check().await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}
