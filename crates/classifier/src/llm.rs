//! LLM classifier over an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any other compatible
//! endpoint. The model is given the registered handlers and asked for a
//! single JSON object `{"handler", "confidence", "reasoning"}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use switchyard_core::error::ClassifierError;
use switchyard_core::{Classification, HandlerInfo, IntentClassifier, Message, Role};
use tracing::{debug, warn};

/// Messages of history included in the prompt.
const PROMPT_HISTORY: usize = 6;

pub struct LlmClassifier {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    handlers: Vec<HandlerInfo>,
    client: reqwest::Client,
}

impl LlmClassifier {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        handlers: Vec<HandlerInfo>,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClassifierError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            handlers,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You route user requests to exactly one handler. Available handlers:\n",
        );
        for h in &self.handlers {
            prompt.push_str(&format!("- {}: {}\n", h.name, h.description));
        }
        prompt.push_str(
            "\nRespond with only a JSON object: \
             {\"handler\": <name>, \"confidence\": <0.0-1.0>, \"reasoning\": <short string>}",
        );
        prompt
    }

    fn build_messages(&self, query: &str, recent_history: &[Message]) -> Vec<serde_json::Value> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.system_prompt(),
        })];
        let start = recent_history.len().saturating_sub(PROMPT_HISTORY);
        for m in &recent_history[start..] {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": m.content }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": query }));
        messages
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawClassification {
    handler: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Extract a classification from model output, tolerating prose or code
/// fences around the JSON object.
pub(crate) fn parse_classification(
    content: &str,
    handlers: &[HandlerInfo],
) -> Result<Classification, ClassifierError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => {
            return Err(ClassifierError::InvalidResponse(
                "no JSON object in model output".into(),
            ));
        }
    };
    let raw: RawClassification = serde_json::from_str(json)
        .map_err(|e| ClassifierError::InvalidResponse(format!("bad classification JSON: {e}")))?;

    if !handlers.iter().any(|h| h.name == raw.handler) {
        return Err(ClassifierError::InvalidResponse(format!(
            "unknown handler: {}",
            raw.handler
        )));
    }
    Ok(Classification::new(raw.handler, raw.confidence, raw.reasoning))
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(
        &self,
        query: &str,
        recent_history: &[Message],
    ) -> Result<Classification, ClassifierError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": self.build_messages(query, recent_history),
            "temperature": self.temperature,
            "stream": false,
        });

        debug!(model = %self.model, "Sending classification request");

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Unavailable(format!("request timed out: {e}"))
            } else {
                ClassifierError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Classifier endpoint returned error");
            return Err(ClassifierError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::InvalidResponse("empty choices".into()))?;

        parse_classification(&content, &self.handlers)
    }

    async fn health_check(&self) -> Result<(), ClassifierError> {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClassifierError::Unavailable(format!(
                "models endpoint returned {}",
                response.status()
            )))
        }
    }
}
