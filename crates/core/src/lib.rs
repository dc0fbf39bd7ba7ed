// FastAgency Core
//
// Agents, tools and LLM drivers for two-agent tool conversations, plus the web
// surfer tool built on top of them.
//
// Key design decisions:
// - LlmConfig is validated eagerly (construction, deserialization and every
//   consumer); validation errors list every offending field
// - Agents are Arc handles; tools attach to caller/executor pairs through the
//   Toolable trait, many-to-many
// - Tools are defined via a Tool trait and executed through a ToolRegistry
// - Error handling distinguishes between user-visible and internal tool errors
// - LLM access goes through the LlmDriver trait so every flow can run against
//   a scripted driver

// Runtime types
pub mod tool_types;

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm_config;
pub mod llm_drivers;
pub mod message;
pub mod tools;
pub mod web_surfer;

// In-memory implementations for examples and testing
pub mod scripted_driver;

// LLM Driver implementations
pub mod openai;

// Re-exports for convenience
pub use agent::{Agent, AgentBuilder, AgentKind, HumanInputMode, HumanInputProvider};
pub use config::LlmEnv;
pub use conversation::{ChatResult, RunOptions, SummaryMethod, DEFAULT_SUMMARY_PROMPT};
pub use error::{FastAgencyError, Result};
pub use llm_config::{FieldError, LlmConfig, LlmConfigEntry, ValidationError};
pub use message::{ChatMessage, IoMessage};

// LLM driver types re-exports
pub use llm_drivers::{
    create_driver, LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmMessageRole,
    LlmResponse, LlmResponseStream, LlmStreamEvent, ProviderType, SharedLlmDriver,
};
pub use openai::OpenAIProtocolLlmDriver;
pub use scripted_driver::{RecordedRequest, ScriptedLlmDriver, ScriptedResponse};

// Tool abstraction re-exports
pub use tools::{
    register_tools, Tool, ToolExecutionResult, ToolInternalError, ToolRegistry, Toolable,
};
pub use tool_types::{ToolCall, ToolDefinition, ToolResult};

pub use web_surfer::{WebSurferAnswer, WebSurferSettings, WebSurferTool, WebSurferToolBuilder};
