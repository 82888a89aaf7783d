//! Wikipedia Tool
//!
//! Looks up short encyclopedia summaries through a `KnowledgeSource`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use agent_core::{AgentError, Result as CoreResult, RetryPolicy, Tool, ToolResult, ToolSchema};

use crate::knowledge::KnowledgeSource;
use crate::model::Summary;

const NAME: &str = "wikipedia";

/// Observation when the search finds nothing
pub const NO_RESULT: &str = "No good Wikipedia Search Result was found";

/// Tool for encyclopedia lookups
pub struct WikipediaTool {
    source: Arc<dyn KnowledgeSource>,
    top_k: usize,
    max_summary_chars: usize,
    max_total_chars: usize,
    retry: RetryPolicy,
}

impl WikipediaTool {
    pub fn new(source: Arc<dyn KnowledgeSource>) -> Self {
        Self {
            source,
            top_k: 3,
            max_summary_chars: 1000,
            max_total_chars: 4000,
            retry: RetryPolicy {
                attempts: 2,
                initial_delay: Duration::from_millis(250),
                ..RetryPolicy::default()
            },
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    #[must_use]
    pub fn with_limits(mut self, max_summary_chars: usize, max_total_chars: usize) -> Self {
        self.max_summary_chars = max_summary_chars;
        self.max_total_chars = max_total_chars;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn render(&self, summaries: &[Summary]) -> String {
        let blocks: Vec<String> = summaries
            .iter()
            .map(|s| {
                format!(
                    "Page: {}\nSummary: {}",
                    s.title,
                    truncate_at_sentence(&s.text, self.max_summary_chars)
                )
            })
            .collect();
        truncate_chars(&blocks.join("\n\n"), self.max_total_chars)
    }
}

/// Cut `text` to at most `max` chars, at the last sentence end if one exists
fn truncate_at_sentence(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut = truncate_chars(text, max);
    match cut.rfind(". ") {
        Some(idx) if idx > 0 => cut[..=idx].to_string(),
        _ => cut,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "A tool for searching the Internet to find various information on the topics mentioned. Input should be a search query.".into(),
            category: Some("knowledge".into()),
        }
    }

    async fn execute(&self, input: &str) -> CoreResult<ToolResult> {
        let query = input.trim();
        if query.is_empty() {
            return Ok(ToolResult::failure(NAME, "Please provide a search query."));
        }

        let summaries = self
            .retry
            .run(NAME, || async {
                self.source
                    .lookup(query, self.top_k)
                    .await
                    .map_err(AgentError::from)
            })
            .await
            .map_err(|e| AgentError::tool_execution(NAME, e))?;

        if summaries.is_empty() {
            return Ok(ToolResult::success(NAME, NO_RESULT));
        }

        let titles: Vec<&str> = summaries.iter().map(|s| s.title.as_str()).collect();
        let data = serde_json::json!({ "titles": titles, "source": self.source.name() });
        Ok(ToolResult::success(NAME, self.render(&summaries)).with_data(data))
    }
}
