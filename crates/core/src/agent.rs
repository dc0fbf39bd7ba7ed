// Conversable agents
//
// An Agent is a cheap handle (Arc inner) so the same agent can be shared by a
// conversation, a tool registration and a test at once. Each agent plays up to
// two roles in a tool exchange:
// - caller: its LLM is offered tool definitions and may request calls
// - executor: it holds the tool implementations and runs requested calls
//
// The LLM driver is created lazily from the agent's LlmConfig on first use,
// unless a driver override was supplied at build time.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{FastAgencyError, Result};
use crate::llm_config::LlmConfig;
use crate::llm_drivers::{create_driver, LlmCallConfig, SharedLlmDriver};
use crate::tool_types::{ToolCall, ToolDefinition, ToolResult};
use crate::tools::{Tool, ToolRegistry};

/// Default system message for conversable (assistant) agents
pub const DEFAULT_ASSISTANT_SYSTEM_MESSAGE: &str = "You are a helpful AI Assistant.";

/// When an agent asks a human before replying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HumanInputMode {
    /// Before every reply
    Always,
    /// Only when a termination message arrives
    Terminate,
    /// Never; the agent is fully autonomous
    Never,
}

/// Source of human replies (console, UI, scripted answers in tests)
#[async_trait]
pub trait HumanInputProvider: Send + Sync {
    /// Ask the human; an empty answer means "use the automatic reply"
    async fn get_human_input(&self, prompt: &str) -> Result<String>;
}

/// Role hint used for defaults and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Conversable,
    UserProxy,
}

struct AgentInner {
    name: String,
    system_message: String,
    llm_config: Option<LlmConfig>,
    human_input_mode: HumanInputMode,
    kind: AgentKind,
    driver_override: Option<SharedLlmDriver>,
    cached_driver: Mutex<Option<SharedLlmDriver>>,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    llm_tools: RwLock<Vec<ToolDefinition>>,
    executor: RwLock<ToolRegistry>,
}

/// Handle to a conversable agent
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Builder for an LLM-backed assistant agent
    pub fn conversable(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, AgentKind::Conversable)
    }

    /// Builder for a user proxy: no system prompt, asks a human by default
    pub fn user_proxy(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, AgentKind::UserProxy)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn system_message(&self) -> &str {
        &self.inner.system_message
    }

    pub fn llm_config(&self) -> Option<&LlmConfig> {
        self.inner.llm_config.as_ref()
    }

    pub fn human_input_mode(&self) -> HumanInputMode {
        self.inner.human_input_mode
    }

    pub fn kind(&self) -> AgentKind {
        self.inner.kind
    }

    /// Whether this agent can call an LLM (and therefore request tools)
    pub fn has_llm(&self) -> bool {
        self.inner.llm_config.is_some() || self.inner.driver_override.is_some()
    }

    pub(crate) fn ensure_llm_capable(&self) -> Result<()> {
        if self.has_llm() {
            Ok(())
        } else {
            Err(FastAgencyError::config(format!(
                "Agent '{}' has no LLM configuration and cannot call tools",
                self.name()
            )))
        }
    }

    /// Offer a function definition to this agent's LLM.
    ///
    /// A definition with the same name replaces the previous one.
    pub fn register_for_llm(&self, definition: ToolDefinition) -> Result<()> {
        self.ensure_llm_capable()?;

        let mut tools = self.inner.llm_tools.write();
        match tools.iter_mut().find(|t| t.name == definition.name) {
            Some(existing) => *existing = definition,
            None => tools.push(definition),
        }
        Ok(())
    }

    /// Make this agent able to execute a function
    pub fn register_for_execution(&self, tool: Arc<dyn Tool>) {
        self.inner.executor.write().register_arc(tool);
    }

    /// Definitions offered to this agent's LLM
    pub fn llm_tools(&self) -> Vec<ToolDefinition> {
        self.inner.llm_tools.read().clone()
    }

    /// Names of the functions this agent executes, sorted
    pub fn executable_tools(&self) -> Vec<String> {
        self.inner
            .executor
            .read()
            .tool_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn can_execute(&self, name: &str) -> bool {
        self.inner.executor.read().has(name)
    }

    pub(crate) fn is_executor(&self) -> bool {
        !self.inner.executor.read().is_empty()
    }

    /// Run one requested call against this agent's registry
    pub async fn execute_tool(&self, tool_call: &ToolCall) -> ToolResult {
        // Snapshot so the lock is not held across the await
        let registry = self.inner.executor.read().clone();
        registry.execute(tool_call).await
    }

    /// The driver used for this agent's LLM calls, created on first use
    pub fn driver(&self) -> Result<Option<SharedLlmDriver>> {
        if let Some(driver) = &self.inner.driver_override {
            return Ok(Some(Arc::clone(driver)));
        }
        let Some(config) = &self.inner.llm_config else {
            return Ok(None);
        };

        let mut cached = self.inner.cached_driver.lock();
        if let Some(driver) = cached.as_ref() {
            return Ok(Some(Arc::clone(driver)));
        }
        let driver = create_driver(config)?;
        *cached = Some(Arc::clone(&driver));
        Ok(Some(driver))
    }

    /// Call settings derived from the agent's LlmConfig
    pub fn call_config(&self) -> LlmCallConfig {
        self.inner
            .llm_config
            .as_ref()
            .map(LlmCallConfig::from)
            .unwrap_or_default()
    }

    pub(crate) fn human_input(&self) -> Option<Arc<dyn HumanInputProvider>> {
        self.inner.human_input.clone()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("human_input_mode", &self.inner.human_input_mode)
            .field("has_llm", &self.has_llm())
            .field("llm_tools", &self.inner.llm_tools.read().len())
            .field("executable_tools", &self.executable_tools())
            .finish()
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    name: String,
    kind: AgentKind,
    system_message: Option<String>,
    llm_config: Option<LlmConfig>,
    human_input_mode: Option<HumanInputMode>,
    driver: Option<SharedLlmDriver>,
    human_input: Option<Arc<dyn HumanInputProvider>>,
}

impl AgentBuilder {
    fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            system_message: None,
            llm_config: None,
            human_input_mode: None,
            driver: None,
            human_input: None,
        }
    }

    pub fn system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn llm_config(mut self, config: LlmConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    pub fn human_input_mode(mut self, mode: HumanInputMode) -> Self {
        self.human_input_mode = Some(mode);
        self
    }

    /// Use this driver instead of one built from the LlmConfig
    pub fn driver(mut self, driver: SharedLlmDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn human_input(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.human_input = Some(provider);
        self
    }

    /// Validate and build the agent
    pub fn build(self) -> Result<Agent> {
        if self.name.trim().is_empty() {
            return Err(FastAgencyError::config("Agent name must not be empty"));
        }
        if let Some(config) = &self.llm_config {
            config.validate()?;
        }

        let (default_system_message, default_mode) = match self.kind {
            AgentKind::Conversable => (DEFAULT_ASSISTANT_SYSTEM_MESSAGE, HumanInputMode::Terminate),
            AgentKind::UserProxy => ("", HumanInputMode::Always),
        };

        Ok(Agent {
            inner: Arc::new(AgentInner {
                name: self.name,
                system_message: self
                    .system_message
                    .unwrap_or_else(|| default_system_message.to_string()),
                llm_config: self.llm_config,
                human_input_mode: self.human_input_mode.unwrap_or(default_mode),
                kind: self.kind,
                driver_override: self.driver,
                cached_driver: Mutex::new(None),
                human_input: self.human_input,
                llm_tools: RwLock::new(Vec::new()),
                executor: RwLock::new(ToolRegistry::new()),
            }),
        })
    }
}
