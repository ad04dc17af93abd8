//! Web search handler — mock results behind the `network-fetch` capability.
//!
//! Results are cached per conversation so a repeated search is answered
//! from the intelligence cache, and a follow-up suggestion points at the
//! document writer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchyard_core::error::HandlerError;
use switchyard_core::intelligence::infer_topics;
use switchyard_core::{
    CachedKind, CachedResult, Capability, Envelope, Handler, HandlerContext, HandlerOutcome,
    HandlerReply,
};

const PREFIXES: &[&str] = &[
    "search the web for",
    "search the web",
    "search online for",
    "search for",
    "look up",
    "lookup",
    "google",
    "search",
];

pub struct WebSearchHandler;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Strip a leading search verb and trailing punctuation.
pub fn search_terms(query: &str) -> String {
    let trimmed = query.trim().trim_end_matches(['?', '!', '.']);
    for prefix in PREFIXES {
        let matches = trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if let Some(rest) = trimmed.get(prefix.len()..).filter(|_| matches) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    trimmed.to_string()
}

fn mock_results(terms: &str, count: usize) -> Vec<SearchResult> {
    let q = terms.to_lowercase();
    let templates: Vec<(&str, Vec<(&str, &str, &str)>)> = vec![
        (
            "rust",
            vec![
                (
                    "The Rust Programming Language",
                    "https://doc.rust-lang.org/book/",
                    "Rust is a systems programming language focused on safety, speed, and concurrency.",
                ),
                (
                    "Rust by Example",
                    "https://doc.rust-lang.org/rust-by-example/",
                    "A collection of runnable examples that illustrate Rust concepts.",
                ),
            ],
        ),
        (
            "weather",
            vec![(
                "National Weather Service",
                "https://www.weather.gov/",
                "Forecasts, warnings and current conditions across the country.",
            )],
        ),
        (
            "news",
            vec![(
                "Top Stories",
                "https://news.example.com/",
                "The latest headlines, updated throughout the day.",
            )],
        ),
    ];

    let mut results: Vec<SearchResult> = templates
        .iter()
        .filter(|(key, _)| q.contains(*key))
        .flat_map(|(_, entries)| entries.iter())
        .map(|(title, url, snippet)| SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
        })
        .collect();

    let slug: String = q
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let mut n = 1;
    while results.len() < count {
        results.push(SearchResult {
            title: format!("{terms} - result {n}"),
            url: format!("https://search.example.com/{slug}/{n}"),
            snippet: format!("Background reading and references about {terms}."),
        });
        n += 1;
    }
    results.truncate(count);
    results
}

fn render(terms: &str, results: &[SearchResult], cached: bool) -> String {
    let mut out = if cached {
        format!("Results for \"{terms}\" (from earlier in this conversation):\n")
    } else {
        format!("Results for \"{terms}\":\n")
    };
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("{}. {} ({})\n   {}\n", i + 1, r.title, r.url, r.snippet));
    }
    out.trim_end().to_string()
}

/// A cached search for the same terms, if the assembler supplied one.
fn cached_search(envelope: &Envelope, terms: &str) -> Option<Vec<SearchResult>> {
    envelope
        .conversation_intelligence
        .as_ref()?
        .iter()
        .filter(|e| e.kind == CachedKind::SearchResults)
        .find(|e| {
            e.payload
                .get("query")
                .and_then(|q| q.as_str())
                .is_some_and(|q| q.eq_ignore_ascii_case(terms))
        })
        .and_then(|e| serde_json::from_value(e.payload.get("results")?.clone()).ok())
}

#[async_trait]
impl Handler for WebSearchHandler {
    fn name(&self) -> &str {
        "web_search_agent"
    }

    fn description(&self) -> &str {
        "Search the web and summarise what it finds."
    }

    fn required_capabilities(&self) -> &[Capability] {
        &[Capability::NetworkFetch]
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let terms = search_terms(&envelope.query);
        if terms.is_empty() {
            return Err(HandlerError::InvalidInput("Nothing to search for".into()));
        }

        if let Some(results) = cached_search(envelope, &terms) {
            let content = render(&terms, &results, true);
            ctx.emit(self.name(), content.clone()).await;
            return Ok(HandlerOutcome::Completed(HandlerReply::text(content)));
        }

        let results = mock_results(&terms, 3);
        let content = render(&terms, &results, false);
        ctx.emit(self.name(), content.clone()).await;

        let topics = infer_topics(&terms);
        ctx.remember(CachedResult::new(
            serde_json::json!({ "query": terms, "results": results }),
            CachedKind::SearchResults,
            self.name(),
            topics.clone(),
            0.8,
        ))
        .await;
        ctx.remember(CachedResult::suggestion(
            self.name(),
            "document_writer",
            topics,
            0.6,
        ))
        .await;

        Ok(HandlerOutcome::Completed(HandlerReply::text(content)))
    }
}
