//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The model named a tool that is not in the registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool with the same name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// A tool's backing call failed (network, auth, rate limit)
    #[error("Tool '{tool}' failed: {cause}")]
    ToolExecution { tool: String, cause: String },

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Model output did not match the action/answer grammar
    #[error("Parse error: {0}")]
    Parse(String),

    /// Run aborted by a cancellation token or deadline
    #[error("Cancelled")]
    Cancelled,

    /// Session error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Shorthand for a tool backend failure
    pub fn tool_execution(tool: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AgentError::ToolExecution {
            tool: tool.into(),
            cause: cause.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(_) | AgentError::ProviderUnavailable(_) => {
                "Sorry, the AI service is currently unavailable. Please try again in a moment.".into()
            }
            AgentError::ToolNotFound(name) => format!("Sorry, the tool '{}' is not available.", name),
            AgentError::ToolExecution { tool, .. } => {
                format!("Sorry, the {} tool could not be reached. Please try again.", tool)
            }
            AgentError::MaxIterations(_) => {
                "Sorry, I could not reach an answer in time. Please try a simpler question.".into()
            }
            AgentError::Cancelled => "The request was cancelled before an answer was ready.".into(),
            AgentError::RateLimited(_) => "Sorry, too many requests right now. Please wait a moment.".into(),
            AgentError::Auth(_) => "Authentication with the AI service failed. Please check the API keys.".into(),
            _ => "Sorry, an unexpected error occurred while answering.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AgentError::RateLimited("429".into()).is_retryable());
        assert!(AgentError::ProviderUnavailable("503".into()).is_retryable());
        assert!(!AgentError::Auth("bad key".into()).is_retryable());
        assert!(!AgentError::tool_execution("wikipedia", "timeout").is_retryable());
    }

    #[test]
    fn test_tool_execution_display() {
        let err = AgentError::tool_execution("calculator", "connection reset");
        assert_eq!(err.to_string(), "Tool 'calculator' failed: connection reset");
        assert!(err.user_message().contains("calculator"));
    }
}
