// Web Surfer Tool
//
// Lets an LLM-driven caller delegate browsing tasks. Each task runs an inner
// conversation between two private agents:
// - `{prefix}_inner_websurfer`: LLM agent offered the browser tools
// - `{prefix}_inner_assistant`: executes the browser tools, no LLM
// A summarizer LLM then turns the transcript into a structured answer.
//
// Design decisions:
// - Construction validates both LLM configurations eagerly and has no side
//   effects; drivers and the HTTP fetcher are created on first task
// - The caller sees a plain-text report whose first line states success or
//   failure
// - LLM/provider failures inside a task are internal errors (hidden from the
//   caller's LLM); everything else is reported as a tool error
// - Browsing sessions are kept per caller, so continuing a task on one agent
//   pair never picks up another pair's task

mod answer;
mod browser;
mod html;

pub use answer::WebSurferAnswer;
pub use browser::{
    browser_tools, Browser, FetchError, FetchedPage, HttpPageFetcher, WebPageFetcher,
    BROWSER_TOOL_NAMES, DEFAULT_VIEWPORT_SIZE,
};
pub use html::{clean_whitespace, html_to_page, HtmlPage};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{Agent, HumanInputMode};
use crate::conversation::RunOptions;
use crate::error::{FastAgencyError, Result};
use crate::llm_config::{FieldError, LlmConfig, ValidationError};
use crate::llm_drivers::{create_driver, LlmCallConfig, LlmDriver, LlmMessage, SharedLlmDriver};
use crate::message::ChatMessage;
use crate::tools::{register_tools, Tool, ToolExecutionResult, Toolable};

const WEB_SURFER_TITLE: &str = "WebSurferTool";

pub const CREATE_TASK_FUNCTION: &str = "create_new_web_surfing_task";
pub const CONTINUE_TASK_FUNCTION: &str = "continue_task_with_additional_instructions";

const WEB_SURFER_SYSTEM_MESSAGE: &str = "You are a web surfer with access to a text browser. \
Use visit_page to open a URL, page_down and page_up to scroll, and find_on_page to search the open page. \
Only report what you actually read on the pages; never make up facts. \
When the task is complete (or cannot be completed), reply with what you found and end the message with TERMINATE.";

const SUMMARIZER_SYSTEM_MESSAGE: &str = "You summarize web browsing sessions. \
Reply with a single JSON object and nothing else. The object has the fields \
task (string), is_successful (boolean), short_answer (string), long_answer (string) \
and visited_links (array of URLs). Example:";

/// Limits for the inner browsing session
#[derive(Debug, Clone, PartialEq)]
pub struct WebSurferSettings {
    /// Turns of the inner web surfer / assistant conversation
    pub max_inner_turns: usize,
    /// Extra summarizer attempts after malformed output
    pub max_retries: usize,
    /// Characters per browser viewport
    pub viewport_size: usize,
}

impl Default for WebSurferSettings {
    fn default() -> Self {
        Self {
            max_inner_turns: 10,
            max_retries: 3,
            viewport_size: DEFAULT_VIEWPORT_SIZE,
        }
    }
}

#[derive(Clone)]
struct TaskSession {
    task: String,
    browser: Arc<Browser>,
    surfer: Agent,
    assistant: Agent,
    messages: Vec<ChatMessage>,
}

struct WebSurferInner {
    name_prefix: String,
    llm_config: LlmConfig,
    summarizer_llm_config: LlmConfig,
    settings: WebSurferSettings,
    driver: Option<SharedLlmDriver>,
    summarizer_driver: Option<SharedLlmDriver>,
    fetcher: Option<Arc<dyn WebPageFetcher>>,
    /// Latest session per caller name
    sessions: Mutex<HashMap<String, TaskSession>>,
}

/// Browsing capability attachable to any caller/executor agent pair
#[derive(Clone)]
pub struct WebSurferTool {
    inner: Arc<WebSurferInner>,
}

impl WebSurferTool {
    /// Validate the configurations and create the tool
    pub fn new(
        name_prefix: impl Into<String>,
        llm_config: LlmConfig,
        summarizer_llm_config: LlmConfig,
    ) -> Result<Self> {
        Self::builder(name_prefix, llm_config, summarizer_llm_config).build()
    }

    pub fn builder(
        name_prefix: impl Into<String>,
        llm_config: LlmConfig,
        summarizer_llm_config: LlmConfig,
    ) -> WebSurferToolBuilder {
        WebSurferToolBuilder {
            name_prefix: name_prefix.into(),
            llm_config,
            summarizer_llm_config,
            settings: WebSurferSettings::default(),
            driver: None,
            summarizer_driver: None,
            fetcher: None,
        }
    }

    pub fn name_prefix(&self) -> &str {
        &self.inner.name_prefix
    }

    pub fn llm_config(&self) -> &LlmConfig {
        &self.inner.llm_config
    }

    pub fn summarizer_llm_config(&self) -> &LlmConfig {
        &self.inner.summarizer_llm_config
    }

    pub fn settings(&self) -> &WebSurferSettings {
        &self.inner.settings
    }

    /// Task of `caller`'s most recent browsing session
    pub fn last_task(&self, caller: &str) -> Option<String> {
        self.inner.sessions.lock().get(caller).map(|s| s.task.clone())
    }

    /// The functions this tool contributes to `caller`'s pair
    pub fn tools_for(&self, caller: &str) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(CreateTaskTool {
                surfer: self.clone(),
                caller: caller.to_string(),
            }),
            Arc::new(ContinueTaskTool {
                surfer: self.clone(),
                caller: caller.to_string(),
            }),
        ]
    }

    /// Run a new browsing task from scratch, replacing `caller`'s session
    pub async fn create_task(&self, caller: &str, task: &str) -> Result<WebSurferAnswer> {
        let browser = Arc::new(Browser::new(self.fetcher()?, self.inner.settings.viewport_size));
        let (surfer, assistant) = self.inner_agents(&browser)?;

        info!(prefix = %self.inner.name_prefix, caller = %caller, task = %task, "Starting web surfing task");

        let message = format!(
            "We are tasked with the following task:\n\n{}\n\nUse the browser to complete it.",
            task
        );
        let chat = assistant
            .run(&surfer, message, self.inner_run_options())
            .await?;

        let session = TaskSession {
            task: task.to_string(),
            browser,
            surfer,
            assistant,
            messages: chat.messages,
        };
        let answer = self.summarize(&session).await;
        self.inner.sessions.lock().insert(caller.to_string(), session);
        answer
    }

    /// Continue `caller`'s previous task with extra instructions
    pub async fn continue_task(&self, caller: &str, instructions: &str) -> Result<WebSurferAnswer> {
        let previous = self.inner.sessions.lock().get(caller).cloned();
        let Some(mut session) = previous else {
            return Err(FastAgencyError::tool(
                "There is no task to continue. Create a new web surfing task first.",
            ));
        };

        info!(prefix = %self.inner.name_prefix, caller = %caller, task = %session.task, "Continuing web surfing task");

        let chat = session
            .assistant
            .run_with_history(
                &session.surfer,
                session.messages.clone(),
                instructions,
                self.inner_run_options(),
            )
            .await?;

        session.task = format!("{}\n\nAdditional instructions: {}", session.task, instructions);
        session.messages = chat.messages;
        let answer = self.summarize(&session).await;
        self.inner.sessions.lock().insert(caller.to_string(), session);
        answer
    }

    fn fetcher(&self) -> Result<Arc<dyn WebPageFetcher>> {
        match &self.inner.fetcher {
            Some(fetcher) => Ok(Arc::clone(fetcher)),
            None => {
                let fetcher = HttpPageFetcher::new().map_err(|e| FastAgencyError::tool(e.to_string()))?;
                Ok(Arc::new(fetcher))
            }
        }
    }

    fn inner_agents(&self, browser: &Arc<Browser>) -> Result<(Agent, Agent)> {
        let prefix = &self.inner.name_prefix;

        let mut surfer = Agent::conversable(format!("{}_inner_websurfer", prefix))
            .system_message(WEB_SURFER_SYSTEM_MESSAGE)
            .llm_config(self.inner.llm_config.clone())
            .human_input_mode(HumanInputMode::Never);
        if let Some(driver) = &self.inner.driver {
            surfer = surfer.driver(Arc::clone(driver));
        }
        let surfer = surfer.build()?;

        let assistant = Agent::user_proxy(format!("{}_inner_assistant", prefix))
            .human_input_mode(HumanInputMode::Never)
            .build()?;

        register_tools(browser_tools(Arc::clone(browser)), &surfer, &assistant)?;
        Ok((surfer, assistant))
    }

    fn inner_run_options(&self) -> RunOptions {
        RunOptions::new().max_turns(self.inner.settings.max_inner_turns)
    }

    async fn summarize(&self, session: &TaskSession) -> Result<WebSurferAnswer> {
        let driver = match &self.inner.summarizer_driver {
            Some(driver) => Arc::clone(driver),
            None => create_driver(&self.inner.summarizer_llm_config)?,
        };
        let config = LlmCallConfig::from(&self.inner.summarizer_llm_config);

        let example = serde_json::to_string_pretty(&WebSurferAnswer::example())
            .map_err(|e| FastAgencyError::Internal(e.into()))?;
        let transcript = session
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.to_io_message().display_text()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let history = session.browser.history();

        let mut messages = vec![
            LlmMessage::system(format!("{}\n{}", SUMMARIZER_SYSTEM_MESSAGE, example)),
            LlmMessage::user(format!(
                "Task: {}\n\nBrowsing transcript:\n{}\n\nVisited pages:\n{}",
                session.task,
                transcript,
                history.join("\n")
            )),
        ];

        let attempts = self.inner.settings.max_retries + 1;
        for attempt in 1..=attempts {
            let response = driver.chat_completion(messages.clone(), &config).await?;

            match WebSurferAnswer::parse(&response.text) {
                Ok(mut answer) => {
                    if answer.visited_links.is_empty() {
                        answer.visited_links = history;
                    }
                    info!(
                        prefix = %self.inner.name_prefix,
                        is_successful = answer.is_successful,
                        attempt,
                        "Web surfing task summarized"
                    );
                    return Ok(answer);
                }
                Err(e) => {
                    warn!(prefix = %self.inner.name_prefix, attempt, error = %e, "Summarizer returned malformed answer");
                    messages.push(LlmMessage::assistant(response.text));
                    messages.push(LlmMessage::user(format!(
                        "Your reply could not be parsed ({}). Reply with a single JSON object with the fields shown in the example.",
                        e
                    )));
                }
            }
        }

        Err(FastAgencyError::tool(format!(
            "The summarizer did not produce a valid answer after {} attempts",
            attempts
        )))
    }
}

impl Toolable for WebSurferTool {
    fn register(&self, caller: &Agent, executor: &Agent) -> Result<()> {
        register_tools(self.tools_for(caller.name()), caller, executor)?;
        info!(
            prefix = %self.inner.name_prefix,
            caller = %caller.name(),
            executor = %executor.name(),
            "Registered web surfer tool"
        );
        Ok(())
    }
}

impl std::fmt::Debug for WebSurferTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSurferTool")
            .field("name_prefix", &self.inner.name_prefix)
            .field("llm_config", &self.inner.llm_config)
            .field("summarizer_llm_config", &self.inner.summarizer_llm_config)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// Builder for [`WebSurferTool`] with driver and fetcher overrides
pub struct WebSurferToolBuilder {
    name_prefix: String,
    llm_config: LlmConfig,
    summarizer_llm_config: LlmConfig,
    settings: WebSurferSettings,
    driver: Option<SharedLlmDriver>,
    summarizer_driver: Option<SharedLlmDriver>,
    fetcher: Option<Arc<dyn WebPageFetcher>>,
}

impl WebSurferToolBuilder {
    pub fn settings(mut self, settings: WebSurferSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Driver for the inner web surfer agent
    pub fn driver(mut self, driver: SharedLlmDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Driver for the summarizer
    pub fn summarizer_driver(mut self, driver: SharedLlmDriver) -> Self {
        self.summarizer_driver = Some(driver);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn WebPageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Validate everything and build the tool
    pub fn build(self) -> Result<WebSurferTool> {
        let mut errors = Vec::new();

        if self.name_prefix.trim().is_empty() {
            errors.push(FieldError::new(
                "name_prefix",
                "String should have at least 1 character",
            ));
        }
        errors.extend(
            self.llm_config
                .field_errors()
                .into_iter()
                .map(|e| e.nested("llm_config")),
        );
        errors.extend(
            self.summarizer_llm_config
                .field_errors()
                .into_iter()
                .map(|e| e.nested("summarizer_llm_config")),
        );
        if self.settings.max_inner_turns == 0 {
            errors.push(FieldError::new(
                "settings.max_inner_turns",
                "Input should be greater than 0",
            ));
        }
        if self.settings.viewport_size == 0 {
            errors.push(FieldError::new(
                "settings.viewport_size",
                "Input should be greater than 0",
            ));
        }

        if !errors.is_empty() {
            return Err(ValidationError::new(WEB_SURFER_TITLE, errors).into());
        }

        Ok(WebSurferTool {
            inner: Arc::new(WebSurferInner {
                name_prefix: self.name_prefix,
                llm_config: self.llm_config,
                summarizer_llm_config: self.summarizer_llm_config,
                settings: self.settings,
                driver: self.driver,
                summarizer_driver: self.summarizer_driver,
                fetcher: self.fetcher,
                sessions: Mutex::new(HashMap::new()),
            }),
        })
    }
}

// ============================================================================
// Functions offered to the caller
// ============================================================================

fn report(result: Result<WebSurferAnswer>) -> ToolExecutionResult {
    match result {
        Ok(answer) => ToolExecutionResult::success(Value::String(answer.to_report())),
        Err(e @ (FastAgencyError::Llm(_) | FastAgencyError::Internal(_))) => {
            ToolExecutionResult::internal_error(e)
        }
        Err(e) => ToolExecutionResult::tool_error(e.to_string()),
    }
}

struct CreateTaskTool {
    surfer: WebSurferTool,
    caller: String,
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        CREATE_TASK_FUNCTION
    }

    fn description(&self) -> &str {
        "Create a new web surfing task. The task is carried out by a web surfer with a browser and the answer is reported back."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task to be solved by browsing the web, with all the details needed"
                }
            },
            "required": ["task"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(task) = arguments.get("task").and_then(|v| v.as_str()) else {
            return ToolExecutionResult::tool_error("Missing required parameter: task");
        };
        report(self.surfer.create_task(&self.caller, task).await)
    }
}

struct ContinueTaskTool {
    surfer: WebSurferTool,
    caller: String,
}

#[async_trait]
impl Tool for ContinueTaskTool {
    fn name(&self) -> &str {
        CONTINUE_TASK_FUNCTION
    }

    fn description(&self) -> &str {
        "Continue the previous web surfing task with additional instructions."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Additional instructions for the task"
                }
            },
            "required": ["message"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(message) = arguments.get("message").and_then(|v| v.as_str()) else {
            return ToolExecutionResult::tool_error("Missing required parameter: message");
        };
        report(self.surfer.continue_task(&self.caller, message).await)
    }
}
