//! # agent-runtime
//!
//! Concrete LLM backends for the agriculture assistant.
//!
//! ## Providers
//!
//! - **Groq** (default): hosted inference over the OpenAI-compatible API
//! - **Ollama** (feature `ollama`): local LLM inference via Ollama
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::groq::{GroqConfig, GroqProvider};
//!
//! let provider = GroqProvider::new(GroqConfig::new(api_key))?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(RetryingProvider::with_defaults(Arc::new(provider))))
//!     .build()?;
//! ```

pub mod groq;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use groq::{GroqConfig, GroqProvider};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{AgentError, LlmProvider, Message, Result, Role};
