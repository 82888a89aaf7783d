//! Agent step events.
//!
//! Emitted while the reasoning loop runs so a chat surface can show
//! progress before the final answer is ready:
//! - `thought`     : the model's reasoning for this step
//! - `action`      : a tool is about to be invoked
//! - `observation` : the tool's output (or failure text)
//! - `parse_error` : the model output was malformed and will be repaired
//! - `final_answer`: the run is over; always the last event

use serde::{Deserialize, Serialize};

use crate::reasoning::RunStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thought { iteration: usize, content: String },

    Action {
        iteration: usize,
        tool: String,
        input: String,
    },

    Observation {
        iteration: usize,
        tool: String,
        output: String,
        success: bool,
    },

    ParseError { iteration: usize, message: String },

    FinalAnswer {
        answer: String,
        status: RunStatus,
        iterations: usize,
        tool_calls: usize,
    },
}

impl AgentEvent {
    /// Short event name, as used in the `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::ParseError { .. } => "parse_error",
            Self::FinalAnswer { .. } => "final_answer",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. })
    }
}
