//! Intent classifiers for the switchyard router.
//!
//! - [`KeywordClassifier`] — deterministic keyword/phrase rules
//! - [`LlmClassifier`] — any OpenAI-compatible chat completions endpoint
//! - [`ChainClassifier`] — ordered fallback across classifiers with timeouts

pub mod chain;
pub mod keyword;
pub mod llm;

pub use chain::ChainClassifier;
pub use keyword::KeywordClassifier;
pub use llm::LlmClassifier;

use std::sync::Arc;
use std::time::Duration;
use switchyard_config::{AppConfig, ClassifierBackend};
use switchyard_core::error::ClassifierError;
use switchyard_core::{HandlerInfo, IntentClassifier};
use tracing::info;

/// Build the configured classifier for the given handlers.
pub fn build_from_config(
    config: &AppConfig,
    handlers: &[HandlerInfo],
) -> Result<Arc<dyn IntentClassifier>, ClassifierError> {
    let keyword = || {
        KeywordClassifier::from_rules(&config.classifier.rules)
            .retain_handlers(handlers.iter().map(|h| h.name.as_str()))
    };
    let llm = || -> Result<LlmClassifier, ClassifierError> {
        let url = config
            .classifier
            .api_url
            .clone()
            .ok_or_else(|| ClassifierError::NotConfigured("classifier.api_url".into()))?;
        LlmClassifier::new(
            url,
            config.classifier.api_key.clone().unwrap_or_default(),
            config.classifier.model.clone(),
            handlers.to_vec(),
        )
        .map(|c| c.with_temperature(config.classifier.temperature))
    };

    let classifier: Arc<dyn IntentClassifier> = match config.classifier.backend {
        ClassifierBackend::Keyword => Arc::new(keyword()),
        ClassifierBackend::Llm => Arc::new(llm()?),
        ClassifierBackend::Chain => {
            let timeout = Duration::from_millis(config.router.classifier_timeout_ms);
            Arc::new(
                ChainClassifier::new("chain")
                    .add(Arc::new(llm()?), timeout)
                    .add(Arc::new(keyword()), timeout),
            )
        }
    };
    info!(classifier = classifier.name(), "Intent classifier ready");
    Ok(classifier)
}
