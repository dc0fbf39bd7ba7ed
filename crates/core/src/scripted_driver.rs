// Scripted LLM Driver
//
// A deterministic driver for tests and offline runs. Responses are consumed in
// order, one per call. Every request is recorded so tests can assert on the
// prompts and tool definitions an agent sent.
//
// Design: clones share the script and the recorded requests, so a test can
// keep a handle after passing the driver to an agent.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{FastAgencyError, Result};
use crate::llm_drivers::{
    LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmResponseStream,
    LlmStreamEvent,
};
use crate::tool_types::ToolCall;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Plain text answer
    Text(String),
    /// Tool calls, with optional accompanying text
    ToolCalls {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    /// The call fails with an LLM error
    Error(String),
}

impl ScriptedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedResponse::Text(text.into())
    }

    /// A single tool call with no text
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        ScriptedResponse::ToolCalls {
            text: String::new(),
            tool_calls: vec![ToolCall::new(name, arguments)],
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptedResponse::Error(message.into())
    }
}

/// A recorded request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<LlmMessage>,
    pub config: LlmCallConfig,
}

impl RecordedRequest {
    /// Names of the tools offered in this request
    pub fn tool_names(&self) -> Vec<String> {
        self.config.tools.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<ScriptedResponse>,
    fallback: Option<String>,
    requests: Vec<RecordedRequest>,
}

/// Scripted driver for tests
///
/// # Example
///
/// ```ignore
/// let driver = ScriptedLlmDriver::new(vec![
///     ScriptedResponse::tool_call("visit_page", json!({"url": "https://example.com"})),
///     ScriptedResponse::text("Done. TERMINATE"),
/// ]);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedLlmDriver {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedLlmDriver {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                responses: responses.into(),
                ..Default::default()
            })),
        }
    }

    /// Driver that always answers with the same text
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(text)
    }

    /// Text returned once the script is exhausted
    pub fn with_fallback(self, text: impl Into<String>) -> Self {
        self.state.lock().fallback = Some(text.into());
        self
    }

    /// Append a response to the script
    pub fn push(&self, response: ScriptedResponse) {
        self.state.lock().responses.push_back(response);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.state.lock().responses.len()
    }

    fn next_response(&self, messages: Vec<LlmMessage>, config: &LlmCallConfig) -> Result<ScriptedResponse> {
        let mut state = self.state.lock();
        state.requests.push(RecordedRequest {
            messages,
            config: config.clone(),
        });

        if let Some(response) = state.responses.pop_front() {
            return Ok(response);
        }
        match &state.fallback {
            Some(text) => Ok(ScriptedResponse::Text(text.clone())),
            None => Err(FastAgencyError::llm("scripted driver exhausted")),
        }
    }
}

#[async_trait]
impl LlmDriver for ScriptedLlmDriver {
    async fn chat_completion_stream(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponseStream> {
        let response = self.next_response(messages, config)?;

        let metadata = LlmCompletionMetadata {
            model: Some(config.model.clone()),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        };

        let events: Vec<Result<LlmStreamEvent>> = match response {
            ScriptedResponse::Text(text) => vec![
                Ok(LlmStreamEvent::TextDelta(text)),
                Ok(LlmStreamEvent::Done(metadata)),
            ],
            ScriptedResponse::ToolCalls { text, tool_calls } => vec![
                Ok(LlmStreamEvent::TextDelta(text)),
                Ok(LlmStreamEvent::ToolCalls(tool_calls)),
                Ok(LlmStreamEvent::Done(LlmCompletionMetadata {
                    finish_reason: Some("tool_calls".to_string()),
                    ..metadata
                })),
            ],
            ScriptedResponse::Error(message) => return Err(FastAgencyError::llm(message)),
        };

        Ok(Box::pin(stream::iter(events)))
    }
}

impl std::fmt::Debug for ScriptedLlmDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScriptedLlmDriver")
            .field("remaining", &state.responses.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}
