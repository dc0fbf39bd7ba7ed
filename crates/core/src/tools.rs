// Tool Abstraction
//
// Tools are defined using the `Tool` trait and collected in a `ToolRegistry`
// owned by the executor agent. Composite capabilities (several functions that
// belong together, like the web surfer) implement `Toolable`, which attaches
// their functions to a caller/executor agent pair.
//
// Design decisions:
// - Error handling distinguishes between user-visible errors and internal errors
// - Internal errors are logged but not exposed to the LLM
// - Attachment is not ownership: agents hold Arc references to tools, tools
//   hold nothing of the agents, so one tool can serve many pairs

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::agent::Agent;
use crate::error::Result;
use crate::tool_types::{ToolCall, ToolDefinition, ToolResult};

// ============================================================================
// Tool Execution Result - Error Handling Contract
// ============================================================================

/// Result of a tool execution.
///
/// - `Success`: Tool executed successfully, result is returned to LLM
/// - `ToolError`: Tool-level error that should be shown to the LLM
///   (e.g., "Invalid URL", "No page is open")
/// - `InternalError`: System-level error that should NOT be exposed to the LLM
///   (e.g., provider authentication failures)
#[derive(Debug)]
pub enum ToolExecutionResult {
    /// Successful execution with a JSON result
    Success(Value),

    /// Tool-level error that is safe to show to the LLM
    ToolError(String),

    /// Internal/system error that should NOT be exposed to the LLM
    InternalError(ToolInternalError),
}

impl ToolExecutionResult {
    /// Create a successful result
    pub fn success(value: impl Into<Value>) -> Self {
        ToolExecutionResult::Success(value.into())
    }

    /// Create a tool-level error (safe to show to LLM)
    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    /// Create an internal error (will be hidden from LLM)
    pub fn internal_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::new(error))
    }

    /// Convert to a ToolResult for the conversation.
    ///
    /// Both error kinds are packaged as `{"error": "..."}` in the result field;
    /// internal errors carry a generic message.
    pub fn into_tool_result(self, tool_call_id: &str, tool_name: &str) -> ToolResult {
        match self {
            ToolExecutionResult::Success(value) => ToolResult {
                tool_call_id: tool_call_id.to_string(),
                result: Some(value),
                error: None,
            },
            ToolExecutionResult::ToolError(message) => ToolResult {
                tool_call_id: tool_call_id.to_string(),
                result: Some(serde_json::json!({ "error": message })),
                error: None,
            },
            ToolExecutionResult::InternalError(err) => {
                error!(
                    tool_name = %tool_name,
                    tool_call_id = %tool_call_id,
                    error = %err.message,
                    "Tool internal error (details hidden from LLM)"
                );

                ToolResult {
                    tool_call_id: tool_call_id.to_string(),
                    result: Some(serde_json::json!({
                        "error": "An internal error occurred while executing the tool"
                    })),
                    error: None,
                }
            }
        }
    }
}

/// Internal error details (logged but not exposed to LLM)
#[derive(Debug)]
pub struct ToolInternalError {
    /// Error message for logging
    pub message: String,
    /// Optional source error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolInternalError {
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }
}

impl std::fmt::Display for ToolInternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolInternalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ============================================================================
// Tool Trait
// ============================================================================

/// A single function that an LLM can request and an executor agent can run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within an executor's registry; the LLM calls the tool by it
    fn name(&self) -> &str;

    /// Description provided to the LLM
    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;

    /// Definition offered to the caller's LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

// ============================================================================
// Toolable - registration contract for composite tools
// ============================================================================

/// A capability that can be attached to a caller/executor agent pair.
///
/// The caller's LLM is offered the capability's function definitions, the
/// executor gets the implementations. Registering the same capability on
/// several pairs is allowed.
pub trait Toolable: Send + Sync {
    /// Attach this capability to `caller` (requests) and `executor` (runs)
    fn register(&self, caller: &Agent, executor: &Agent) -> Result<()>;
}

/// Attach a set of tools to a caller/executor pair.
///
/// The caller is checked before anything is mutated so a failed registration
/// leaves both agents untouched.
pub fn register_tools(tools: Vec<Arc<dyn Tool>>, caller: &Agent, executor: &Agent) -> Result<()> {
    caller.ensure_llm_capable()?;

    for tool in tools {
        caller.register_for_llm(tool.to_definition())?;
        executor.register_for_execution(tool);
    }
    Ok(())
}

// ============================================================================
// ToolRegistry - Collection of Tools
// ============================================================================

/// Tools an executor agent can run, keyed by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool; a tool with the same name is replaced
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Execute a tool call.
    ///
    /// Unknown tools produce a tool-level error result rather than failing the
    /// conversation, so the LLM can correct itself.
    pub async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool
                .execute(tool_call.arguments.clone())
                .await
                .into_tool_result(&tool_call.id, &tool_call.name),
            None => ToolExecutionResult::tool_error(format!(
                "Function {} not found.",
                tool_call.name
            ))
            .into_tool_result(&tool_call.id, &tool_call.name),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
