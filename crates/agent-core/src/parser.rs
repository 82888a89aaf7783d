//! ReAct Output Parser
//!
//! The only place where the model's free text is interpreted. The model is
//! asked to answer either with
//!
//! ```text
//! Thought: ...
//! Action: <tool name>
//! Action Input: <input>
//! ```
//!
//! or with
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: ...
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AgentError, Result};

/// Marker that introduces the final answer
pub const FINAL_ANSWER: &str = "Final Answer:";

/// Marker that introduces a tool observation
pub const OBSERVATION: &str = "Observation:";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("action pattern is valid")
});

static ACTION_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action\s*\d*\s*:").expect("action marker pattern is valid"));

/// What the model decided
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelOutput {
    /// Invoke a tool
    Action {
        thought: String,
        tool: String,
        input: String,
    },
    /// Answer the user
    Finish { thought: String, answer: String },
}

impl ModelOutput {
    pub fn thought(&self) -> &str {
        match self {
            ModelOutput::Action { thought, .. } | ModelOutput::Finish { thought, .. } => thought,
        }
    }
}

/// Parse one model completion.
///
/// Anything after a model-written `Observation:` is discarded, since
/// observations only ever come from real tool calls.
pub fn parse(text: &str) -> Result<ModelOutput> {
    let text = match text.find(OBSERVATION) {
        Some(idx) => &text[..idx],
        None => text,
    };
    let text = text.trim();

    if text.is_empty() {
        return Err(AgentError::Parse("Empty response from the model".into()));
    }

    let final_idx = text.find(FINAL_ANSWER);

    if let Some(caps) = ACTION_RE.captures(text) {
        if final_idx.is_some() {
            return Err(AgentError::Parse(
                "Response contains both a final answer and an action".into(),
            ));
        }
        let whole = caps.get(0).map_or(0, |m| m.start());
        let tool = clean_tool_name(caps.get(1).map_or("", |m| m.as_str()));
        let input = clean_input(caps.get(2).map_or("", |m| m.as_str()));

        if tool.is_empty() {
            return Err(AgentError::Parse("Action names no tool".into()));
        }

        return Ok(ModelOutput::Action {
            thought: clean_thought(&text[..whole]),
            tool,
            input,
        });
    }

    if let Some(idx) = final_idx {
        let answer = text[idx + FINAL_ANSWER.len()..].trim().to_string();
        if answer.is_empty() {
            return Err(AgentError::Parse("Final answer is empty".into()));
        }
        return Ok(ModelOutput::Finish {
            thought: clean_thought(&text[..idx]),
            answer,
        });
    }

    if ACTION_ONLY_RE.is_match(text) {
        return Err(AgentError::Parse("Missing 'Action Input:' after 'Action:'".into()));
    }

    Err(AgentError::Parse(
        "Missing 'Action:' or 'Final Answer:' after 'Thought:'".into(),
    ))
}

fn clean_thought(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix("Thought:").unwrap_or(raw).trim().to_string()
}

fn clean_tool_name(raw: &str) -> String {
    raw.lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c| matches!(c, '`' | '*' | '"' | '\'' | '[' | ']'))
        .trim()
        .to_string()
}

fn clean_input(raw: &str) -> String {
    let raw = raw.trim();
    // Models sometimes echo the stop marker without a leading newline.
    let raw = raw.split("\nThought:").next().unwrap_or(raw).trim();
    let raw = raw.trim_matches('`').trim();
    raw.trim_matches('"').trim().to_string()
}
