// Error types for agents, tools and conversations

use std::time::Duration;
use thiserror::Error;

use crate::llm_config::ValidationError;

/// Result type alias for FastAgency operations
pub type Result<T> = std::result::Result<T, FastAgencyError>;

/// Errors that can occur while building agents or running conversations
#[derive(Debug, Error)]
pub enum FastAgencyError {
    /// LLM driver error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Structural validation failed at construction time
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration error (missing credentials, unusable agent setup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Agent is human-gated but nobody can answer
    #[error("Agent '{agent}' requires human input but no input provider is attached")]
    HumanInputRequired { agent: String },

    /// Reflection summary did not arrive in time
    #[error("Summary not ready after {0:?}")]
    SummaryTimeout(Duration),

    /// Reflection summary failed or was never produced
    #[error("Summary unavailable: {0}")]
    SummaryUnavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FastAgencyError {
    /// Create an LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        FastAgencyError::Llm(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        FastAgencyError::ToolExecution(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        FastAgencyError::Configuration(msg.into())
    }

    /// Whether this error came from eager validation
    pub fn is_validation(&self) -> bool {
        matches!(self, FastAgencyError::Validation(_))
    }
}
