// Tool definitions, calls and results exchanged between agents and LLMs
//
// Tools are identified by name. Execution happens via the ToolRegistry of the
// executor agent, which looks tools up by the name in the ToolCall.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Function definition offered to an LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used by LLM and for registry lookup)
    pub name: String,
    /// Tool description for LLM
    pub description: String,
    /// JSON schema for tool parameters
    pub parameters: Value,
}

/// Tool call from LLM response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Arguments as JSON
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call with a fresh ID
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::now_v7().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// Tool execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool call ID this result corresponds to
    pub tool_call_id: String,
    /// Result data (success)
    pub result: Option<Value>,
    /// Error message (failure)
    pub error: Option<String>,
}

impl ToolResult {
    /// Text handed back to the LLM as the tool message content.
    ///
    /// String results are passed through verbatim, everything else is
    /// serialized as JSON.
    pub fn content(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {}", error);
        }
        match &self.result {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        }
    }
}
