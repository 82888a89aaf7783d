//! Reasoning Tool
//!
//! Answers climate and agriculture questions with a single completion over
//! a fixed point-wise template.

use std::sync::Arc;

use async_trait::async_trait;

use agent_core::{
    AgentError, GenerationOptions, LlmProvider, Message, Result as CoreResult, Tool, ToolResult,
    ToolSchema,
};

const NAME: &str = "reasoning";

const TEMPLATE: &str = "You are an AI assistant specialized in climate-resilient agriculture. Your task is to answer user questions related to climate, agriculture, environmental impacts, and sustainable practices. Logically arrive at the solution and provide a detailed explanation, displayed point-wise.

Question:{question}
Answer:";

/// Tool for logic-based and reasoning questions
pub struct ReasoningTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl ReasoningTool {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_options(provider, GenerationOptions::default())
    }

    pub fn with_options(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    fn prompt(question: &str) -> String {
        TEMPLATE.replace("{question}", question)
    }
}

#[async_trait]
impl Tool for ReasoningTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "A tool for answering logic-based and reasoning questions about climate, agriculture, environmental impacts and sustainable practices.".into(),
            category: Some("reasoning".into()),
        }
    }

    async fn execute(&self, input: &str) -> CoreResult<ToolResult> {
        let completion = self
            .provider
            .complete(&[Message::user(Self::prompt(input.trim()))], &self.options)
            .await
            .map_err(|e| AgentError::tool_execution(NAME, e))?;

        Ok(ToolResult::success(NAME, completion.content))
    }
}
