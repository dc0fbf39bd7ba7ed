// Environment-driven LLM settings
//
// Provider credentials come from the process environment. A `.env` file in the
// working directory (or any parent) is loaded first when present; variables
// already set in the environment win.

use std::sync::Once;

use crate::error::{FastAgencyError, Result};
use crate::llm_config::{LlmConfig, LlmConfigEntry};

/// Default temperature used by the prepared configurations
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Snapshot of LLM-related environment variables
#[derive(Clone, Default)]
pub struct LlmEnv {
    pub openai_api_key: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_api_endpoint: Option<String>,
    pub azure_api_version: Option<String>,
    pub azure_gpt4o_model: Option<String>,
    pub together_api_key: Option<String>,
}

impl LlmEnv {
    /// Read settings from the environment (after loading `.env` if present)
    pub fn from_env() -> Self {
        load_dotenv();

        Self {
            openai_api_key: env_var("OPENAI_API_KEY"),
            azure_api_key: env_var("AZURE_OPENAI_API_KEY"),
            azure_api_endpoint: env_var("AZURE_API_ENDPOINT"),
            azure_api_version: env_var("AZURE_API_VERSION"),
            azure_gpt4o_model: env_var("AZURE_GPT4O_MODEL"),
            together_api_key: env_var("TOGETHER_API_KEY"),
        }
    }

    /// Configuration for an OpenAI model using `OPENAI_API_KEY`
    pub fn openai_llm_config(&self, model: &str) -> Result<LlmConfig> {
        let api_key = require(&self.openai_api_key, "OPENAI_API_KEY")?;
        let config = LlmConfig::new(vec![LlmConfigEntry::openai(model, api_key)])?
            .with_temperature(DEFAULT_TEMPERATURE)?;
        Ok(config)
    }

    /// Configuration for the Azure GPT-4o deployment
    pub fn azure_gpt4o_llm_config(&self) -> Result<LlmConfig> {
        let api_key = require(&self.azure_api_key, "AZURE_OPENAI_API_KEY")?;
        let endpoint = require(&self.azure_api_endpoint, "AZURE_API_ENDPOINT")?;
        let api_version = self
            .azure_api_version
            .clone()
            .unwrap_or_else(|| "2024-02-01".to_string());
        let deployment = self
            .azure_gpt4o_model
            .clone()
            .unwrap_or_else(|| "gpt-4o".to_string());

        let config = LlmConfig::new(vec![LlmConfigEntry::azure(
            deployment,
            api_key,
            endpoint,
            api_version,
        )])?
        .with_temperature(DEFAULT_TEMPERATURE)?;
        Ok(config)
    }
}

impl std::fmt::Debug for LlmEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEnv")
            .field("openai_api_key_set", &self.openai_api_key.is_some())
            .field("azure_api_key_set", &self.azure_api_key.is_some())
            .field("azure_api_endpoint", &self.azure_api_endpoint)
            .field("azure_api_version", &self.azure_api_version)
            .field("azure_gpt4o_model", &self.azure_gpt4o_model)
            .field("together_api_key_set", &self.together_api_key.is_some())
            .finish()
    }
}

/// Load `.env` into the process environment, at most once per process
pub fn load_dotenv() {
    static LOADED: Once = Once::new();
    LOADED.call_once(|| match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load environment file"),
    });
}

/// Read a variable, treating empty values as unset
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| FastAgencyError::config(format!("{} environment variable not set", name)))
}
