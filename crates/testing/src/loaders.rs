// Documentation module manifests and their loaders
//
// Each documentation example is described by a TOML manifest. Loading a
// module means doing what importing the example does: an OpenAPI client
// fetches and checks its specification, an agent workflow builds its LLM
// configurations (credentials from the environment) and its agents.

use anyhow::{anyhow, bail, ensure, Context};
use fastagency_core::{Agent, HumanInputMode, LlmConfig, LlmConfigEntry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Timeout for fetching an OpenAPI document
const OPENAPI_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Manifests
// ============================================================================

/// Parsed documentation module manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModuleManifest {
    /// Client generated from a remote OpenAPI specification
    OpenapiClient {
        openapi_url: String,
        /// Security schemes the example configures
        #[serde(default)]
        security: Vec<String>,
    },
    /// Agents wired into a workflow
    Ag2Workflow {
        #[serde(default)]
        llm_configs: BTreeMap<String, LlmConfigSpec>,
        #[serde(default)]
        agents: Vec<AgentSpec>,
    },
}

impl ModuleManifest {
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModuleManifest::OpenapiClient { .. } => "openapi_client",
            ModuleManifest::Ag2Workflow { .. } => "ag2_workflow",
        }
    }
}

/// LLM configuration whose secrets come from environment variables
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LlmConfigSpec {
    pub config_list: Vec<LlmEntrySpec>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LlmEntrySpec {
    pub model: String,
    /// Name of the variable holding the API key
    pub api_key_env: String,
    #[serde(default)]
    pub api_type: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSpecKind {
    Conversable,
    UserProxy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub kind: AgentSpecKind,
    #[serde(default)]
    pub system_message: Option<String>,
    /// Key into `llm_configs`
    #[serde(default)]
    pub llm_config: Option<String>,
    #[serde(default)]
    pub human_input_mode: Option<HumanInputMode>,
}

// ============================================================================
// Loaded modules
// ============================================================================

/// What a successful load produced
#[derive(Debug)]
pub enum LoadedModule {
    OpenApiClient {
        title: Option<String>,
        operations: usize,
        security_schemes: Vec<String>,
    },
    Workflow {
        agents: Vec<Agent>,
    },
}

pub type LoaderFuture = Pin<Box<dyn Future<Output = anyhow::Result<LoadedModule>> + Send>>;

/// Loader registered for a module reference
pub type Loader = fn(ModuleManifest) -> LoaderFuture;

/// Loader for `openapi_client` manifests
pub fn openapi_client(manifest: ModuleManifest) -> LoaderFuture {
    Box::pin(async move {
        let kind = manifest.kind();
        let ModuleManifest::OpenapiClient {
            openapi_url,
            security,
        } = manifest
        else {
            bail!("expected an openapi_client manifest, got {}", kind);
        };
        load_openapi_client(&openapi_url, &security).await
    })
}

/// Loader for `ag2_workflow` manifests; credentials come from the environment
/// or a `.env` file
pub fn ag2_workflow(manifest: ModuleManifest) -> LoaderFuture {
    Box::pin(async move { load_ag2_workflow(&manifest, workflow_env) })
}

fn workflow_env(name: &str) -> Option<String> {
    fastagency_core::config::load_dotenv();
    fastagency_core::config::env_var(name)
}

/// Fetch an OpenAPI document and check it describes a usable client
pub async fn load_openapi_client(
    openapi_url: &str,
    security: &[String],
) -> anyhow::Result<LoadedModule> {
    let client = reqwest::Client::builder()
        .timeout(OPENAPI_FETCH_TIMEOUT)
        .build()
        .context("failed to create HTTP client")?;

    tracing::debug!(url = %openapi_url, "Fetching OpenAPI specification");
    let document: serde_json::Value = client
        .get(openapi_url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {}", openapi_url))?
        .error_for_status()
        .with_context(|| format!("failed to fetch {}", openapi_url))?
        .json()
        .await
        .with_context(|| format!("{} is not a JSON document", openapi_url))?;

    ensure!(
        document.get("openapi").and_then(|v| v.as_str()).is_some(),
        "{} has no 'openapi' version field",
        openapi_url
    );

    let paths = document
        .get("paths")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("{} has no 'paths'", openapi_url))?;
    let operations: usize = paths
        .values()
        .filter_map(|item| item.as_object())
        .map(|item| item.len())
        .sum();
    ensure!(operations > 0, "{} defines no operations", openapi_url);

    let schemes = document
        .pointer("/components/securitySchemes")
        .and_then(|v| v.as_object());
    for name in security {
        ensure!(
            schemes.map(|s| s.contains_key(name)).unwrap_or(false),
            "security scheme '{}' is not defined by {}",
            name,
            openapi_url
        );
    }

    Ok(LoadedModule::OpenApiClient {
        title: document
            .pointer("/info/title")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        operations,
        security_schemes: security.to_vec(),
    })
}

/// Build the configurations and agents a workflow manifest describes
pub fn load_ag2_workflow(
    manifest: &ModuleManifest,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<LoadedModule> {
    let ModuleManifest::Ag2Workflow {
        llm_configs,
        agents,
    } = manifest
    else {
        bail!("expected an ag2_workflow manifest, got {}", manifest.kind());
    };

    let mut configs = BTreeMap::new();
    for (name, spec) in llm_configs {
        let config = build_llm_config(spec, &lookup)
            .with_context(|| format!("invalid llm config '{}'", name))?;
        configs.insert(name.as_str(), config);
    }

    let mut built = Vec::with_capacity(agents.len());
    for spec in agents {
        let mut builder = match spec.kind {
            AgentSpecKind::Conversable => Agent::conversable(&spec.name),
            AgentSpecKind::UserProxy => Agent::user_proxy(&spec.name),
        };
        if let Some(message) = &spec.system_message {
            builder = builder.system_message(message);
        }
        if let Some(mode) = spec.human_input_mode {
            builder = builder.human_input_mode(mode);
        }
        if let Some(key) = &spec.llm_config {
            let config = configs
                .get(key.as_str())
                .ok_or_else(|| anyhow!("agent '{}' refers to unknown llm config '{}'", spec.name, key))?;
            builder = builder.llm_config(config.clone());
        }
        built.push(
            builder
                .build()
                .with_context(|| format!("failed to build agent '{}'", spec.name))?,
        );
    }

    tracing::debug!(agents = built.len(), configs = configs.len(), "Loaded workflow");
    Ok(LoadedModule::Workflow { agents: built })
}

fn build_llm_config(
    spec: &LlmConfigSpec,
    lookup: &impl Fn(&str) -> Option<String>,
) -> anyhow::Result<LlmConfig> {
    let mut entries = Vec::with_capacity(spec.config_list.len());
    for entry in &spec.config_list {
        let api_key = lookup(&entry.api_key_env)
            .ok_or_else(|| anyhow!("{} environment variable not set", entry.api_key_env))?;

        let mut built = LlmConfigEntry::openai(&entry.model, api_key);
        if let Some(api_type) = &entry.api_type {
            built.api_type = api_type.clone();
        }
        built.base_url = entry.base_url.clone();
        built.api_version = entry.api_version.clone();
        entries.push(built);
    }

    let mut config = LlmConfig::new(entries)?;
    if let Some(temperature) = spec.temperature {
        config = config.with_temperature(temperature)?;
    }
    Ok(config)
}
