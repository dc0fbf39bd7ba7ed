// Conversation messages
//
// ChatMessage is the unit of a two-agent transcript. IoMessage is the typed,
// UI-facing projection of the same transcript (text, suggested function call,
// function call execution, workflow completion).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool_types::{ToolCall, ToolResult};

/// Marker that ends a conversation when it closes a message
pub const TERMINATION_MARKER: &str = "TERMINATE";

/// One message exchanged between two agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Name of the sending agent
    pub sender: String,
    /// Name of the receiving agent
    pub recipient: String,
    /// Text content; tool-call-only messages have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by the sender
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set when this message carries a tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn base(sender: &str, recipient: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Plain text message
    pub fn text(sender: &str, recipient: &str, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::base(sender, recipient)
        }
    }

    /// Message requesting tool calls; empty text is dropped
    pub fn tool_calls(
        sender: &str,
        recipient: &str,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        let content = content.into();
        Self {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
            ..Self::base(sender, recipient)
        }
    }

    /// Message carrying the result of one tool call
    pub fn tool_result(sender: &str, recipient: &str, result: &ToolResult) -> Self {
        Self {
            content: Some(result.content()),
            tool_call_id: Some(result.tool_call_id.clone()),
            ..Self::base(sender, recipient)
        }
    }

    /// Text content or the empty string
    pub fn content_text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_tool_result(&self) -> bool {
        self.tool_call_id.is_some()
    }

    /// Whether this message ends the conversation
    pub fn is_termination_msg(&self) -> bool {
        !self.has_tool_calls()
            && !self.is_tool_result()
            && self
                .content
                .as_deref()
                .map(|c| c.trim_end().ends_with(TERMINATION_MARKER))
                .unwrap_or(false)
    }

    /// Typed projection for UIs and transcript checks
    pub fn to_io_message(&self) -> IoMessage {
        if self.has_tool_calls() {
            let call = &self.tool_calls[0];
            return IoMessage::SuggestedFunctionCall {
                sender: self.sender.clone(),
                recipient: self.recipient.clone(),
                function_name: call.name.clone(),
                call_id: call.id.clone(),
                arguments: call.arguments.clone(),
            };
        }
        if let Some(call_id) = &self.tool_call_id {
            return IoMessage::FunctionCallExecution {
                sender: self.sender.clone(),
                recipient: self.recipient.clone(),
                function_name: None,
                call_id: call_id.clone(),
                retval: self.content_text().to_string(),
            };
        }
        IoMessage::TextMessage {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            body: self.content_text().to_string(),
        }
    }
}

/// UI-facing message taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IoMessage {
    TextMessage {
        sender: String,
        recipient: String,
        body: String,
    },
    SuggestedFunctionCall {
        sender: String,
        recipient: String,
        function_name: String,
        call_id: String,
        arguments: serde_json::Value,
    },
    FunctionCallExecution {
        sender: String,
        recipient: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_name: Option<String>,
        call_id: String,
        retval: String,
    },
    WorkflowCompleted {
        result: String,
    },
}

impl IoMessage {
    /// Text a human would read for this message
    pub fn display_text(&self) -> String {
        match self {
            IoMessage::TextMessage { body, .. } => body.clone(),
            IoMessage::SuggestedFunctionCall {
                function_name,
                arguments,
                ..
            } => format!("{}({})", function_name, arguments),
            IoMessage::FunctionCallExecution { retval, .. } => retval.clone(),
            IoMessage::WorkflowCompleted { result } => result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_termination_detection() {
        assert!(ChatMessage::text("a", "b", "All done. TERMINATE").is_termination_msg());
        assert!(ChatMessage::text("a", "b", "TERMINATE\n").is_termination_msg());
        assert!(!ChatMessage::text("a", "b", "TERMINATE the process later").is_termination_msg());
        assert!(!ChatMessage::text("a", "b", "").is_termination_msg());
    }

    #[test]
    fn test_tool_result_is_not_termination() {
        let result = ToolResult {
            tool_call_id: "call_1".to_string(),
            result: Some(json!("TERMINATE")),
            error: None,
        };
        let message = ChatMessage::tool_result("exec", "caller", &result);
        assert!(!message.is_termination_msg());
    }

    #[test]
    fn test_io_projection() {
        let call = ToolCall::new("create_new_web_surfing_task", json!({"task": "find"}));
        let message = ChatMessage::tool_calls("assistant", "user", "", vec![call.clone()]);

        match message.to_io_message() {
            IoMessage::SuggestedFunctionCall {
                function_name,
                call_id,
                ..
            } => {
                assert_eq!(function_name, "create_new_web_surfing_task");
                assert_eq!(call_id, call.id);
            }
            other => panic!("unexpected projection: {:?}", other),
        }
        assert!(message.content.is_none());
    }

    #[test]
    fn test_io_message_serialization_tag() {
        let msg = IoMessage::WorkflowCompleted {
            result: "ok".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "workflow_completed");
    }
}
