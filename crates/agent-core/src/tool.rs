//! Tool System
//!
//! Tools are registered once at startup and invoked by the reasoning loop.
//! Every tool takes free text in and returns text out; the loop refers to a
//! registered tool through its `ToolId`, never through the raw model text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Handle to a registered tool.
///
/// Only the registry hands these out, so a `ToolId` always refers to a tool
/// that exists in the registry that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolId(usize);

impl ToolId {
    /// Position of the tool in registration order
    pub fn index(self) -> usize {
        self.0
    }
}

/// A resolved tool invocation decided by the reasoning loop
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Registered tool to invoke
    pub tool: ToolId,

    /// Tool name, kept for logging and events
    pub name: String,

    /// Free-text input extracted from the model output
    pub input: String,

    /// Call ID for tracking
    pub id: String,
}

impl ToolCall {
    pub fn new(tool: ToolId, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            tool,
            name: name.into(),
            input: input.into(),
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (answer text or an explanation of what went wrong)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A result the tool produced but that is not a usable answer
    /// (e.g. non-mathematical input to the calculator).
    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            output: error.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Tool definition shown to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// When to use the tool (shown to the model)
    pub description: String,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's name and description
    fn schema(&self) -> ToolSchema;

    /// Execute the tool on free-text input.
    ///
    /// `Ok` with a failed `ToolResult` means the tool ran but could not help;
    /// `Err(AgentError::ToolExecution)` means its backend failed.
    async fn execute(&self, input: &str) -> Result<ToolResult>;
}

/// Registry for available tools, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    schemas: Vec<ToolSchema>,
    index: HashMap<String, ToolId>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<ToolId> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<ToolId> {
        let schema = tool.schema();
        if self.index.contains_key(&schema.name) {
            return Err(AgentError::DuplicateTool(schema.name));
        }

        let id = ToolId(self.tools.len());
        tracing::debug!(tool = %schema.name, "Registered tool");
        self.index.insert(schema.name.clone(), id);
        self.schemas.push(schema);
        self.tools.push(tool);
        Ok(id)
    }

    /// All tool schemas in registration order
    pub fn list(&self) -> Vec<ToolSchema> {
        self.schemas.clone()
    }

    /// Look up a tool id by (trimmed) name
    pub fn resolve_id(&self, name: &str) -> Result<ToolId> {
        let name = name.trim();
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Look up a tool by (trimmed) name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        let id = self.resolve_id(name)?;
        Ok(self.get(id))
    }

    /// Get a tool by id
    pub fn get(&self, id: ToolId) -> Arc<dyn Tool> {
        Arc::clone(&self.tools[id.0])
    }

    /// Schema of a registered tool
    pub fn schema(&self, id: ToolId) -> &ToolSchema {
        &self.schemas[id.0]
    }

    /// Execute a resolved tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        self.get(call.tool).execute(&call.input).await
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `name: description` lines, one per tool, in registration order
    pub fn render_menu(&self) -> String {
        self.schemas
            .iter()
            .map(|s| format!("{}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool(&'static str);

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.0.into(),
                description: format!("Echoes input for {}", self.0),
                category: None,
            }
        }

        async fn execute(&self, input: &str) -> Result<ToolResult> {
            Ok(ToolResult::success(self.0, input))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool("wikipedia")).unwrap();
        registry.register(EchoTool("calculator")).unwrap();
        registry.register(EchoTool("reasoning")).unwrap();
        registry
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = registry();
        let err = registry.register(EchoTool("calculator")).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "calculator"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = registry();
        let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["wikipedia", "calculator", "reasoning"]);
        assert_eq!(registry.list(), registry.list());
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = registry();
        assert!(registry.resolve("calculator").is_ok());
        assert!(registry.resolve("  calculator ").is_ok());
        let err = registry.resolve("search").err().unwrap();
        assert!(matches!(err, AgentError::ToolNotFound(name) if name == "search"));
    }

    #[test]
    fn test_render_menu() {
        let registry = registry();
        let menu = registry.render_menu();
        assert!(menu.starts_with("wikipedia: Echoes input for wikipedia\n"));
        assert_eq!(menu.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_execute_by_id() {
        let registry = registry();
        let id = registry.resolve_id("reasoning").unwrap();
        assert_eq!(id.index(), 2);

        let result = registry
            .execute(&ToolCall::new(id, "reasoning", "why mulch?"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "why mulch?");
    }
}
