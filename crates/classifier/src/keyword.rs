//! Keyword classifier — deterministic rules mapping words and phrases to handlers.
//!
//! Single words match whole query tokens; phrases containing a space match
//! as substrings. The most recent user messages in history contribute at
//! half weight, so short follow-ups ("and tomorrow?") stay with the topic.

use async_trait::async_trait;
use std::collections::BTreeMap;
use switchyard_core::error::ClassifierError;
use switchyard_core::{Classification, IntentClassifier, Message, Role};

/// User messages from history consulted for follow-ups.
const HISTORY_WINDOW: usize = 2;
const HISTORY_WEIGHT: f64 = 0.5;

pub struct KeywordClassifier {
    /// (handler, lowercase keywords), in handler-name order
    rules: Vec<(String, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_rules(rules: &BTreeMap<String, Vec<String>>) -> Self {
        let mut classifier = Self::new();
        for (handler, keywords) in rules {
            classifier = classifier.rule(handler, keywords.iter().map(String::as_str));
        }
        classifier
    }

    /// Add keywords for a handler.
    pub fn rule<'a>(mut self, handler: &str, keywords: impl IntoIterator<Item = &'a str>) -> Self {
        let keywords: Vec<String> = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        match self.rules.iter_mut().find(|(h, _)| h == handler) {
            Some((_, existing)) => existing.extend(keywords),
            None => self.rules.push((handler.to_string(), keywords)),
        }
        self
    }

    /// Drop rules for handlers that are not registered.
    pub fn retain_handlers<'a>(mut self, handlers: impl IntoIterator<Item = &'a str>) -> Self {
        let known: Vec<&str> = handlers.into_iter().collect();
        self.rules.retain(|(h, _)| known.contains(&h.as_str()));
        self
    }

    pub fn handler_count(&self) -> usize {
        self.rules.len()
    }

    fn score_text(keywords: &[String], text: &str) -> usize {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        keywords
            .iter()
            .filter(|k| {
                if k.contains(' ') {
                    lower.contains(k.as_str())
                } else {
                    tokens.contains(&k.as_str())
                }
            })
            .count()
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(
        &self,
        query: &str,
        recent_history: &[Message],
    ) -> Result<Classification, ClassifierError> {
        if self.rules.is_empty() {
            return Err(ClassifierError::NotConfigured("no keyword rules".into()));
        }

        let recent_user: Vec<&Message> = recent_history
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .take(HISTORY_WINDOW)
            .collect();

        let mut scores: Vec<(&str, f64)> = self
            .rules
            .iter()
            .map(|(handler, keywords)| {
                let direct = Self::score_text(keywords, query) as f64;
                let history: f64 = recent_user
                    .iter()
                    .map(|m| Self::score_text(keywords, &m.content) as f64 * HISTORY_WEIGHT)
                    .sum();
                // History only breaks silence; it never outweighs the query itself
                let score = if direct > 0.0 { direct } else { history };
                (handler.as_str(), score)
            })
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (best, best_score) = scores[0];
        if best_score <= 0.0 {
            return Ok(Classification::new(best, 0.0, "no keyword matched"));
        }
        if let Some(&(runner_up, runner_score)) = scores.get(1)
            && runner_score == best_score
        {
            return Ok(Classification::new(
                best,
                0.0,
                format!("tie between {best} and {runner_up}"),
            ));
        }

        let confidence = (0.5 + 0.25 * best_score).min(1.0);
        Ok(Classification::new(
            best,
            confidence,
            format!("matched {best_score} keyword(s) for {best}"),
        ))
    }
}
