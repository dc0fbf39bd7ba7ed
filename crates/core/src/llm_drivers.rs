// LLM Driver Abstractions
//
// This module encapsulates all abstractions needed to interact with LLM backends:
// - LlmDriver trait and types for provider-agnostic LLM interactions
// - Driver factory for creating drivers from a validated LlmConfig
// - Message types for LLM calls
//
// Credentials travel inside LlmConfig. The factory never reads environment
// variables; see `config::LlmEnv` for that.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{FastAgencyError, Result};
use crate::llm_config::{LlmConfig, AZURE_API_TYPE, OPENAI_API_TYPE};
use crate::openai::OpenAIProtocolLlmDriver;
use crate::tool_types::{ToolCall, ToolDefinition};

// ============================================================================
// LlmDriver Trait
// ============================================================================

/// Type alias for the LLM response stream
pub type LlmResponseStream = Pin<Box<dyn Stream<Item = Result<LlmStreamEvent>> + Send>>;

/// Shared driver handle; agents and tools clone it freely
pub type SharedLlmDriver = Arc<dyn LlmDriver>;

/// Events emitted during LLM streaming
#[derive(Debug, Clone)]
pub enum LlmStreamEvent {
    /// Text delta (incremental content)
    TextDelta(String),
    /// Tool calls from the LLM
    ToolCalls(Vec<ToolCall>),
    /// Streaming completed
    Done(LlmCompletionMetadata),
    /// Error during streaming
    Error(String),
}

/// Metadata about LLM completion
#[derive(Debug, Clone, Default)]
pub struct LlmCompletionMetadata {
    pub total_tokens: Option<u32>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

/// Trait for LLM drivers
///
/// Implementations handle provider-specific API calls and response parsing.
#[async_trait]
pub trait LlmDriver: Send + Sync {
    /// Call the LLM with streaming response
    async fn chat_completion_stream(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponseStream>;

    /// Call the LLM and collect the whole response
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        use futures::StreamExt;

        let mut stream = self.chat_completion_stream(messages, config).await?;
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut metadata = LlmCompletionMetadata::default();

        while let Some(event) = stream.next().await {
            match event? {
                LlmStreamEvent::TextDelta(delta) => text.push_str(&delta),
                LlmStreamEvent::ToolCalls(calls) => tool_calls = calls,
                LlmStreamEvent::Done(meta) => metadata = meta,
                LlmStreamEvent::Error(err) => return Err(FastAgencyError::llm(err)),
            }
        }

        Ok(LlmResponse {
            text,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            metadata,
        })
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Message format for LLM calls (provider-agnostic)
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMessage {
    pub role: LlmMessageRole,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn text(role: LlmMessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(LlmMessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(LlmMessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(LlmMessageRole::Assistant, content)
    }

    /// Assistant message requesting tool calls
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: LlmMessageRole::Assistant,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Tool result answering a previous tool call
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmMessageRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Message role for LLM calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMessageRole {
    System,
    User,
    Assistant,
    Tool,
}

// ============================================================================
// Configuration and Response Types
// ============================================================================

/// Configuration for an LLM call
#[derive(Debug, Clone, Default)]
pub struct LlmCallConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Sampling seed for backends that support deterministic output
    pub seed: Option<u64>,
    pub tools: Vec<ToolDefinition>,
}

impl LlmCallConfig {
    /// Offer tools for this call
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

impl From<&LlmConfig> for LlmCallConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config
                .primary()
                .map(|entry| entry.model.clone())
                .unwrap_or_default(),
            temperature: config.temperature,
            max_tokens: None,
            seed: config.cache_seed,
            tools: Vec::new(),
        }
    }
}

/// Response from an LLM call (non-streaming)
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub metadata: LlmCompletionMetadata,
}

// ============================================================================
// Driver Factory
// ============================================================================

/// Backend protocol flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    AzureOpenAI,
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Same spellings LlmConfig validation accepts
        match s {
            OPENAI_API_TYPE => Ok(ProviderType::OpenAI),
            AZURE_API_TYPE => Ok(ProviderType::AzureOpenAI),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::AzureOpenAI => write!(f, "azure"),
        }
    }
}

/// Create an LLM driver for the first entry of a configuration.
///
/// The configuration is validated again here; an invalid config never
/// produces a driver.
pub fn create_driver(config: &LlmConfig) -> Result<SharedLlmDriver> {
    config.validate()?;

    let entry = config
        .primary()
        .ok_or_else(|| FastAgencyError::config("LLM configuration has no entries"))?;

    let api_key = entry.api_key.as_ref().ok_or_else(|| {
        FastAgencyError::config(format!(
            "API key is required for model '{}'",
            entry.model
        ))
    })?;

    let provider: ProviderType = entry.api_type.parse().map_err(FastAgencyError::config)?;
    let timeout = config.timeout.map(std::time::Duration::from_secs);

    let driver = match provider {
        ProviderType::OpenAI => match &entry.base_url {
            Some(base_url) => OpenAIProtocolLlmDriver::with_base_url(
                api_key,
                format!("{}/chat/completions", base_url.trim_end_matches('/')),
            ),
            None => OpenAIProtocolLlmDriver::new(api_key),
        },
        ProviderType::AzureOpenAI => {
            let base_url = entry.base_url.as_deref().unwrap_or_default();
            let api_version = entry.api_version.as_deref().unwrap_or_default();
            OpenAIProtocolLlmDriver::azure(api_key, base_url, &entry.model, api_version)
        }
    };

    let driver = match timeout {
        Some(timeout) => driver.with_timeout(timeout)?,
        None => driver,
    };

    tracing::debug!(provider = %provider, model = %entry.model, "Created LLM driver");
    Ok(Arc::new(driver))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_config::LlmConfigEntry;

    #[test]
    fn test_call_config_from_llm_config() {
        let config = LlmConfig::new(vec![LlmConfigEntry::openai("gpt-4o-mini", "sk-test")])
            .unwrap()
            .with_temperature(0.8)
            .unwrap();

        let call_config = LlmCallConfig::from(&config);

        assert_eq!(call_config.model, "gpt-4o-mini");
        assert_eq!(call_config.temperature, Some(0.8));
        assert_eq!(call_config.seed, None);
        assert!(call_config.tools.is_empty());
    }

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!("openai".parse::<ProviderType>().unwrap(), ProviderType::OpenAI);
        assert_eq!("azure".parse::<ProviderType>().unwrap(), ProviderType::AzureOpenAI);
        assert!("anthropic".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_provider_type_accepts_what_validation_accepts() {
        for api_type in ["openai", "azure", "azure_openai", "Azure", "OPENAI"] {
            let mut entry =
                LlmConfigEntry::azure("gpt-4o", "key", "https://example.openai.azure.com", "2024-02-01");
            entry.api_type = api_type.to_string();
            let validated = LlmConfig::new(vec![entry]).is_ok();
            let parsed = api_type.parse::<ProviderType>().is_ok();
            assert_eq!(validated, parsed, "api_type '{}'", api_type);
        }
    }

    #[test]
    fn test_provider_type_display() {
        assert_eq!(ProviderType::OpenAI.to_string(), "openai");
        assert_eq!(ProviderType::AzureOpenAI.to_string(), "azure");
    }

    #[test]
    fn test_create_driver_requires_api_key() {
        let mut entry = LlmConfigEntry::openai("gpt-4o", "sk-test");
        entry.api_key = None;
        let config = LlmConfig::new(vec![entry]).unwrap();
        assert!(create_driver(&config).is_err());

        let config = LlmConfig::new(vec![LlmConfigEntry::openai("gpt-4o", "sk-test")]).unwrap();
        assert!(create_driver(&config).is_ok());
    }

    #[test]
    fn test_create_driver_rejects_empty_config_list() {
        let config = LlmConfig {
            config_list: vec![],
            temperature: None,
            timeout: None,
            cache_seed: None,
        };

        let err = create_driver(&config).err().unwrap();
        assert!(err.is_validation());
    }
}
