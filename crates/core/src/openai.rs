// OpenAI Protocol LLM Driver
//
// Implementation of LlmDriver for OpenAI-compatible APIs, including Azure
// OpenAI deployments (same wire protocol, different URL layout and auth header).

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FastAgencyError, Result};
use crate::llm_drivers::{
    LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmMessageRole,
    LlmResponseStream, LlmStreamEvent,
};
use crate::tool_types::{ToolCall, ToolDefinition};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// How the API key is presented to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure)
    ApiKeyHeader,
}

/// OpenAI Protocol LLM Driver
///
/// Supports streaming responses and tool calls.
///
/// # Example
///
/// ```ignore
/// use fastagency_core::openai::OpenAIProtocolLlmDriver;
///
/// let driver = OpenAIProtocolLlmDriver::new("your-api-key");
/// // or with custom endpoint
/// let driver = OpenAIProtocolLlmDriver::with_base_url("your-api-key", "https://api.example.com/v1/chat/completions");
/// // or an Azure deployment
/// let driver = OpenAIProtocolLlmDriver::azure("key", "https://res.openai.azure.com", "gpt-4o", "2024-02-01");
/// ```
#[derive(Clone)]
pub struct OpenAIProtocolLlmDriver {
    client: Client,
    api_key: String,
    api_url: String,
    auth: AuthStyle,
}

impl OpenAIProtocolLlmDriver {
    /// Create a new driver with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_URL)
    }

    /// Create a new driver with a custom API URL (for OpenAI-compatible APIs)
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
            auth: AuthStyle::Bearer,
        }
    }

    /// Create a driver for an Azure OpenAI deployment
    pub fn azure(
        api_key: impl Into<String>,
        endpoint: &str,
        deployment: &str,
        api_version: &str,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
            auth: AuthStyle::ApiKeyHeader,
        }
    }

    /// Apply a request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FastAgencyError::llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    /// Endpoint this driver posts to
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn convert_role(role: &LlmMessageRole) -> &'static str {
        match role {
            LlmMessageRole::System => "system",
            LlmMessageRole::User => "user",
            LlmMessageRole::Assistant => "assistant",
            LlmMessageRole::Tool => "tool",
        }
    }

    fn convert_message(msg: &LlmMessage) -> OpenAiMessage {
        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.to_string(),
                    },
                })
                .collect()
        });

        // Assistant messages that only carry tool calls have null content
        let content = if msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content.clone())
        };

        OpenAiMessage {
            role: Self::convert_role(&msg.role).to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|tool| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl LlmDriver for OpenAIProtocolLlmDriver {
    async fn chat_completion_stream(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponseStream> {
        let openai_messages: Vec<OpenAiMessage> =
            messages.iter().map(Self::convert_message).collect();

        let tools = if config.tools.is_empty() {
            None
        } else {
            Some(Self::convert_tools(&config.tools))
        };

        let request = OpenAiRequest {
            model: config.model.clone(),
            messages: openai_messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            seed: config.seed,
            stream: true,
            tools,
        };

        let builder = self.client.post(&self.api_url);
        let builder = match self.auth {
            AuthStyle::Bearer => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            AuthStyle::ApiKeyHeader => builder.header("api-key", &self.api_key),
        };

        let response = builder
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| FastAgencyError::llm(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FastAgencyError::llm(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let byte_stream = response.bytes_stream();
        let event_stream = byte_stream.eventsource();

        let model = config.model.clone();
        let total_tokens = Arc::new(Mutex::new(0u32));
        let accumulated_tool_calls = Arc::new(Mutex::new(Vec::<ToolCall>::new()));

        let converted_stream: LlmResponseStream = Box::pin(event_stream.then(move |result| {
            let model = model.clone();
            let total_tokens = Arc::clone(&total_tokens);
            let accumulated_tool_calls = Arc::clone(&accumulated_tool_calls);

            async move {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => return Ok(LlmStreamEvent::Error(format!("Stream error: {}", e))),
                };

                if event.data == "[DONE]" {
                    let tokens = *total_tokens.lock();
                    return Ok(LlmStreamEvent::Done(LlmCompletionMetadata {
                        total_tokens: Some(tokens),
                        prompt_tokens: None,
                        completion_tokens: Some(tokens),
                        model: Some(model),
                        finish_reason: Some("stop".to_string()),
                    }));
                }

                let chunk = match serde_json::from_str::<OpenAiStreamChunk>(&event.data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        return Ok(LlmStreamEvent::Error(format!(
                            "Failed to parse chunk: {}",
                            e
                        )))
                    }
                };

                // Azure sends content-filter chunks without choices
                let Some(choice) = chunk.choices.first() else {
                    return Ok(LlmStreamEvent::TextDelta(String::new()));
                };

                if let Some(tool_calls) = &choice.delta.tool_calls {
                    let mut acc = accumulated_tool_calls.lock();

                    for tc in tool_calls {
                        let idx = tc.index as usize;
                        while acc.len() <= idx {
                            acc.push(ToolCall {
                                id: String::new(),
                                name: String::new(),
                                arguments: json!(""),
                            });
                        }

                        if let Some(id) = &tc.id {
                            acc[idx].id = id.clone();
                        }
                        if let Some(function) = &tc.function {
                            if let Some(name) = &function.name {
                                acc[idx].name = name.clone();
                            }
                            if let Some(args) = &function.arguments {
                                let current = acc[idx].arguments.as_str().unwrap_or("");
                                let combined = format!("{}{}", current, args);
                                acc[idx].arguments = json!(combined);
                            }
                        }
                    }

                    if choice.finish_reason.is_none() {
                        return Ok(LlmStreamEvent::TextDelta(String::new()));
                    }
                }

                // [DONE] still follows, so a final content chunk keeps its text
                if let Some(content) = choice.delta.content.as_ref().filter(|c| !c.is_empty()) {
                    *total_tokens.lock() += 1;
                    return Ok(LlmStreamEvent::TextDelta(content.clone()));
                }

                if let Some(finish_reason) = &choice.finish_reason {
                    let tokens = *total_tokens.lock();

                    if finish_reason == "tool_calls" {
                        let tool_calls = std::mem::take(&mut *accumulated_tool_calls.lock());
                        if !tool_calls.is_empty() {
                            let parsed_calls: Vec<ToolCall> = tool_calls
                                .into_iter()
                                .map(|mut tc| {
                                    if let Some(args_str) = tc.arguments.as_str() {
                                        tc.arguments =
                                            serde_json::from_str(args_str).unwrap_or(json!({}));
                                    }
                                    tc
                                })
                                .collect();
                            return Ok(LlmStreamEvent::ToolCalls(parsed_calls));
                        }
                    }

                    return Ok(LlmStreamEvent::Done(LlmCompletionMetadata {
                        total_tokens: Some(tokens),
                        prompt_tokens: None,
                        completion_tokens: Some(tokens),
                        model: Some(model),
                        finish_reason: Some(finish_reason.clone()),
                    }));
                }

                Ok(LlmStreamEvent::TextDelta(String::new()))
            }
        }));

        Ok(converted_stream)
    }
}

impl std::fmt::Debug for OpenAIProtocolLlmDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProtocolLlmDriver")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("auth", &self.auth)
            .finish()
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: u32,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_config::{LlmConfig, LlmConfigEntry};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str("data: ");
            body.push_str(chunk);
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn call_config() -> LlmCallConfig {
        LlmCallConfig {
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.8),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_streams_text() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"role":"assistant","content":"Hello"}}]}"#,
            r#"{"choices":[{"delta":{"content":", world"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]);
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let driver = OpenAIProtocolLlmDriver::with_base_url(
            "sk-test",
            format!("{}/v1/chat/completions", server.uri()),
        );
        let response = driver
            .chat_completion(vec![LlmMessage::user("Hi")], &call_config())
            .await
            .unwrap();

        assert_eq!(response.text, "Hello, world");
        assert!(response.tool_calls.is_none());
    }

    #[tokio::test]
    async fn test_accumulates_tool_call_deltas() {
        let server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"visit_page","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"url\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"https://example.com\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let driver = OpenAIProtocolLlmDriver::with_base_url("sk-test", server.uri());
        let response = driver
            .chat_completion(vec![LlmMessage::user("Open it")], &call_config())
            .await
            .unwrap();

        let calls = response.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "visit_page");
        assert_eq!(calls[0].arguments["url"], "https://example.com");
    }

    #[tokio::test]
    async fn test_azure_url_and_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "azure-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse(&[r#"{"choices":[{"delta":{"content":"ok"}}]}"#])),
            )
            .mount(&server)
            .await;

        let driver =
            OpenAIProtocolLlmDriver::azure("azure-key", &server.uri(), "gpt-4o", "2024-02-01");
        let response = driver
            .chat_completion(vec![LlmMessage::user("ping")], &call_config())
            .await
            .unwrap();

        assert_eq!(response.text, "ok");
    }

    #[tokio::test]
    async fn test_cache_seed_is_sent_as_seed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini", "seed": 42})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse(&[r#"{"choices":[{"delta":{"content":"seeded"}}]}"#])),
            )
            .mount(&server)
            .await;

        let llm_config = LlmConfig::new(vec![LlmConfigEntry::openai("gpt-4o-mini", "sk-test")])
            .unwrap()
            .with_cache_seed(42);
        let driver = OpenAIProtocolLlmDriver::with_base_url("sk-test", server.uri());
        let response = driver
            .chat_completion(vec![LlmMessage::user("Hi")], &LlmCallConfig::from(&llm_config))
            .await
            .unwrap();

        assert_eq!(response.text, "seeded");
    }

    #[tokio::test]
    async fn test_error_status_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let driver = OpenAIProtocolLlmDriver::with_base_url("bad", server.uri());
        let err = driver
            .chat_completion(vec![LlmMessage::user("Hi")], &call_config())
            .await
            .unwrap_err();

        assert!(matches!(err, FastAgencyError::Llm(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let driver = OpenAIProtocolLlmDriver::new("sk-very-secret");
        let rendered = format!("{:?}", driver);
        assert!(!rendered.contains("sk-very-secret"));
    }
}
