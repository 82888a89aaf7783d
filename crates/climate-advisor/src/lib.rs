//! # climate-advisor
//!
//! Tools and data clients for a climate-resilient agriculture assistant.
//!
//! ## Tools
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┐
//! │ wikipedia    │ encyclopedia summaries for a search query      │
//! │ calculator   │ worded problem → expression → evaluated value  │
//! │ reasoning    │ point-wise climate/agriculture explanation     │
//! └──────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! The data clients (NOAA CDO, NASA Earth, Copernicus ERA5) are not agent
//! tools; the server exposes them as plain endpoints.

pub mod error;
pub mod knowledge;
pub mod model;
pub mod sources;
pub mod svckit;

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider, ToolRegistry};

pub use error::{AdvisorError, Result};
pub use knowledge::{KnowledgeSource, MockKnowledgeSource, WikipediaClient, WikipediaConfig};
pub use model::{ClimateTable, Observation, Summary};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{CalculatorTool, ReasoningTool, WikipediaTool};
}

/// System prompt preamble for the agriculture assistant
pub const ADVISOR_PROMPT: &str = "You are a Climate-Resilient Agriculture Assistant helping farmers and agricultural policymakers adapt to climate change. Prefer practical, locally applicable advice.
Answer the following questions as best you can. You have access to the following tools:";

/// Register the assistant's tools: wikipedia, calculator, reasoning
pub fn build_registry(
    provider: Arc<dyn LlmProvider>,
    knowledge: Arc<dyn KnowledgeSource>,
    options: &GenerationOptions,
) -> agent_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(tools::WikipediaTool::new(knowledge))?;
    registry.register(tools::CalculatorTool::with_options(provider.clone(), options.clone()))?;
    registry.register(tools::ReasoningTool::with_options(provider, options.clone()))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;

    #[test]
    fn test_registry_order_and_menu() {
        let registry = build_registry(
            Arc::new(ScriptedProvider::texts(Vec::<String>::new())),
            Arc::new(MockKnowledgeSource::new()),
            &GenerationOptions::default(),
        )
        .unwrap();

        assert_eq!(registry.names(), vec!["wikipedia", "calculator", "reasoning"]);
        assert!(registry.render_menu().contains("calculator: A tool for answering math"));
    }
}
