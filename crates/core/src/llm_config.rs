// LLM configuration with eager validation
//
// An LlmConfig describes one or more backend connection entries. The entry list
// must never be empty: `LlmConfig::new`, deserialization and every consumer that
// accepts a config run `validate`, which collects all field errors at once so a
// caller sees the full picture instead of the first failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// OpenAI-compatible endpoint (api.openai.com or any protocol-compatible host)
pub const OPENAI_API_TYPE: &str = "openai";

/// Azure OpenAI deployment endpoint
pub const AZURE_API_TYPE: &str = "azure";

const LLM_CONFIG_TITLE: &str = "LLMConfig";

// ============================================================================
// ValidationError
// ============================================================================

/// A single failed constraint, located by a dotted field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field location, e.g. `config_list` or `config_list.0.model`
    pub loc: String,
    /// Human readable cause
    pub msg: String,
}

impl FieldError {
    pub fn new(loc: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            msg: msg.into(),
        }
    }

    /// Prefix the location with an outer field name
    pub fn nested(self, parent: &str) -> Self {
        Self {
            loc: format!("{}.{}", parent, self.loc),
            msg: self.msg,
        }
    }
}

/// Structural validation failure raised at construction time.
///
/// Rendered as:
///
/// ```text
/// 1 validation error for LLMConfig
/// config_list
///   List should have at least 1 item after validation, not 0
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    title: String,
    errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(title: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            title: title.into(),
            errors,
        }
    }

    /// Name of the validated object
    pub fn title(&self) -> &str {
        &self.title
    }

    /// All collected field errors
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether any error is located at `loc`
    pub fn has_error_at(&self, loc: &str) -> bool {
        self.errors.iter().any(|e| e.loc == loc)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors.len();
        write!(
            f,
            "{} validation error{} for {}",
            count,
            if count == 1 { "" } else { "s" },
            self.title
        )?;
        for error in &self.errors {
            write!(f, "\n{}\n  {}", error.loc, error.msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// LlmConfigEntry
// ============================================================================

/// One backend connection entry
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfigEntry {
    /// Model name (or Azure deployment name)
    pub model: String,

    /// API key for the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Backend flavour: "openai" or "azure"
    #[serde(default = "default_api_type")]
    pub api_type: String,

    /// Base URL override (required for Azure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API version (required for Azure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

fn default_api_type() -> String {
    OPENAI_API_TYPE.to_string()
}

impl LlmConfigEntry {
    /// Entry for the public OpenAI API
    pub fn openai(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: Some(api_key.into()),
            api_type: default_api_type(),
            base_url: None,
            api_version: None,
        }
    }

    /// Entry for an Azure OpenAI deployment
    pub fn azure(
        deployment: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            model: deployment.into(),
            api_key: Some(api_key.into()),
            api_type: AZURE_API_TYPE.to_string(),
            base_url: Some(base_url.into()),
            api_version: Some(api_version.into()),
        }
    }

    /// Point an OpenAI-compatible entry at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn validate_into(&self, index: usize, errors: &mut Vec<FieldError>) {
        let loc = |field: &str| format!("config_list.{}.{}", index, field);

        if self.model.trim().is_empty() {
            errors.push(FieldError::new(
                loc("model"),
                "String should have at least 1 character",
            ));
        }

        match self.api_type.as_str() {
            OPENAI_API_TYPE => {}
            AZURE_API_TYPE => {
                if self.base_url.is_none() {
                    errors.push(FieldError::new(
                        loc("base_url"),
                        "Field required when api_type is 'azure'",
                    ));
                }
                if self.api_version.is_none() {
                    errors.push(FieldError::new(
                        loc("api_version"),
                        "Field required when api_type is 'azure'",
                    ));
                }
            }
            other => errors.push(FieldError::new(
                loc("api_type"),
                format!("Input should be 'openai' or 'azure', got '{}'", other),
            )),
        }

        if let Some(base_url) = &self.base_url {
            match url::Url::parse(base_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => errors.push(FieldError::new(
                    loc("base_url"),
                    "Input should be a valid http or https URL",
                )),
            }
        }
    }
}

impl fmt::Debug for LlmConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfigEntry")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_type", &self.api_type)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

// ============================================================================
// LlmConfig
// ============================================================================

/// LLM configuration shared by agents and tools.
///
/// Fields are public so configurations can be assembled field by field; any
/// consumer (agents, tools, drivers) re-runs [`LlmConfig::validate`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLlmConfig")]
pub struct LlmConfig {
    /// Backend entries; the first entry is used for calls
    pub config_list: Vec<LlmConfigEntry>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Sent as the request `seed` for deterministic sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_seed: Option<u64>,
}

impl LlmConfig {
    /// Build and validate a configuration
    pub fn new(config_list: Vec<LlmConfigEntry>) -> Result<Self, ValidationError> {
        let config = Self {
            config_list,
            temperature: None,
            timeout: None,
            cache_seed: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set temperature, re-validating the result
    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, ValidationError> {
        self.temperature = Some(temperature);
        self.validate()?;
        Ok(self)
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    pub fn with_cache_seed(mut self, seed: u64) -> Self {
        self.cache_seed = Some(seed);
        self
    }

    /// Check every structural constraint, returning all failures together
    pub fn validate(&self) -> Result<(), ValidationError> {
        let errors = self.field_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(LLM_CONFIG_TITLE, errors))
        }
    }

    /// Field errors without wrapping, for callers that merge several objects
    pub fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.config_list.is_empty() {
            errors.push(FieldError::new(
                "config_list",
                format!(
                    "List should have at least 1 item after validation, not {}",
                    self.config_list.len()
                ),
            ));
        }

        for (index, entry) in self.config_list.iter().enumerate() {
            entry.validate_into(index, &mut errors);
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(FieldError::new(
                    "temperature",
                    format!("Input should be between 0 and 2, got {}", temperature),
                ));
            }
        }

        errors
    }

    /// The entry used for calls
    pub fn primary(&self) -> Option<&LlmConfigEntry> {
        self.config_list.first()
    }
}

/// Unvalidated wire shape; converted through `TryFrom` so deserialization
/// enforces the same invariants as `LlmConfig::new`.
#[derive(Deserialize)]
struct RawLlmConfig {
    #[serde(default)]
    config_list: Vec<LlmConfigEntry>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    cache_seed: Option<u64>,
}

impl TryFrom<RawLlmConfig> for LlmConfig {
    type Error = ValidationError;

    fn try_from(raw: RawLlmConfig) -> Result<Self, Self::Error> {
        let config = LlmConfig {
            config_list: raw.config_list,
            temperature: raw.temperature,
            timeout: raw.timeout,
            cache_seed: raw.cache_seed,
        };
        config.validate()?;
        Ok(config)
    }
}
