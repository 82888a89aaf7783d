//! # agent-core
//!
//! Provider-agnostic ReAct agent: conversation state, tool registry,
//! output parsing and the reasoning loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ChatService                             │
//! │  ┌──────────────┐   ┌─────────────────────────────────────┐  │
//! │  │   Sessions   │──►│                Agent                │  │
//! │  └──────────────┘   │  ┌──────────┐ ┌────────┐ ┌────────┐ │  │
//! │                     │  │ Reasoning│─│ Tools  │─│  Llm   │ │  │
//! │                     │  │   Loop   │ │Registry│ │Provider│ │  │
//! │                     │  └──────────┘ └────────┘ └────────┘ │  │
//! │                     └─────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Groq, Ollama or a
//! scripted test double without changing agent logic.

pub mod chat;
pub mod error;
pub mod events;
pub mod message;
pub mod mock;
pub mod parser;
pub mod provider;
pub mod reasoning;
pub mod retry;
pub mod session;
pub mod tool;

pub use chat::ChatService;
pub use error::{AgentError, Result};
pub use events::AgentEvent;
pub use message::{Conversation, Message, Role};
pub use provider::{GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AgentOutcome, AgentStep, ParseRecovery, RunContext, RunStatus};
pub use retry::{RetryPolicy, RetryingProvider};
pub use session::{Session, SessionId, SessionManager};
pub use tool::{Tool, ToolCall, ToolId, ToolRegistry, ToolResult, ToolSchema};
