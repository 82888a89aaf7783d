//! Conversation Messages
//!
//! Turns exchanged between the user and the assistant, and the append-only
//! transcript that holds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions sent to the provider; never stored in a transcript
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message (turn)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        // ~4 characters per token, +4 for role overhead
        u32::try_from(self.content.len() / 4).unwrap_or(u32::MAX).saturating_add(4)
    }
}

/// Greeting every new conversation starts with
pub const DEFAULT_GREETING: &str =
    "Hi, I'm your Climate-Resilient Agriculture Assistant. How can I help you today?";

/// Append-only conversation transcript.
///
/// Turns can only be added at the end; nothing edits or removes them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::with_greeting(DEFAULT_GREETING)
    }
}

impl Conversation {
    /// Empty transcript, without the greeting
    pub fn empty() -> Self {
        Self { messages: Vec::new() }
    }

    /// Transcript seeded with one synthetic assistant greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(greeting)],
        }
    }

    /// Append a turn. Only user and assistant turns belong in a
    /// transcript; system messages are rejected.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.role == Role::System {
            return Err(AgentError::Session(
                "System messages cannot be appended to a conversation".into(),
            ));
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Get all turns in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last turn
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent user turn
    pub fn last_user(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Render every turn as `role: content` lines
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
