//! Calculator Tool
//!
//! Two stages: the language model turns a worded problem into a single
//! expression, which is then evaluated locally. Input that already is a
//! valid expression skips the model.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use agent_core::{
    AgentError, GenerationOptions, LlmProvider, Message, Result as CoreResult, Tool, ToolResult,
    ToolSchema,
};

const NAME: &str = "calculator";

const PROMPT: &str = r#"Translate a math problem into an expression that can be evaluated. Write the expression on a single line inside a ```text block and stop. Use numbers, + - * / ^ %, parentheses and the functions sqrt, abs, exp, ln, floor, ceil, round, sin, cos, tan. If the problem needs no calculation, reply with "Answer: <answer>".

Question: What is 37593 * 67?
```text
37593 * 67
```

Question: What is the square root of 2 raised to the power 3?
```text
sqrt(2) ^ 3
```

Question: {question}
"#;

static TEXT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```text\s*(.*?)\s*```").expect("text block pattern is valid")
});

/// Tool for answering math questions
pub struct CalculatorTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl CalculatorTool {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_options(provider, GenerationOptions::default())
    }

    pub fn with_options(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self {
            provider,
            options: options
                .with_temperature(0.0)
                .with_stop(["```output".to_string()]),
        }
    }

    async fn translate(&self, question: &str) -> CoreResult<String> {
        let prompt = PROMPT.replace("{question}", question);
        let completion = self
            .provider
            .complete(&[Message::user(prompt)], &self.options)
            .await
            .map_err(|e| AgentError::tool_execution(NAME, e))?;
        Ok(completion.content)
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let expr = expr.trim().trim_end_matches('=').replace("**", "^");
    let value = meval::eval_str(&expr).map_err(|e| e.to_string())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err("the result is not a finite number".into())
    }
}

/// Integral values print without a fractional part
pub fn format_value(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

fn answer(expression: &str, value: f64) -> ToolResult {
    ToolResult::success(NAME, format!("Answer: {}", format_value(value)))
        .with_data(json!({ "expression": expression, "value": value }))
}

/// Read the model's translation
fn interpret(reply: &str) -> ToolResult {
    if let Some(caps) = TEXT_BLOCK.captures(reply) {
        let expression = caps.get(1).map_or("", |m| m.as_str());
        return match evaluate(expression) {
            Ok(value) => answer(expression, value),
            Err(e) => ToolResult::failure(NAME, format!("Could not evaluate \"{expression}\": {e}")),
        };
    }

    if let Some(idx) = reply.find("Answer:") {
        return ToolResult::success(NAME, format!("Answer: {}", reply[idx + 7..].trim()));
    }

    ToolResult::failure(
        NAME,
        format!(
            "Could not translate the input into a math expression: {}",
            reply.trim()
        ),
    )
}

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "A tool for answering math related questions. Only input mathematical expressions need to be provided.".into(),
            category: Some("math".into()),
        }
    }

    async fn execute(&self, input: &str) -> CoreResult<ToolResult> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(ToolResult::failure(NAME, "No math problem was given."));
        }

        if let Ok(value) = evaluate(input) {
            return Ok(answer(input, value));
        }

        tracing::debug!(input, "Translating math problem");
        let reply = self.translate(input).await?;
        Ok(interpret(&reply))
    }
}
