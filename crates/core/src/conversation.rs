// Two-agent conversation runner
//
// `Agent::run` drives a bounded exchange between an initiator and a recipient.
// A turn is one reply from the recipient followed by one reply from the
// initiator. The exchange ends early when an agent has nothing to say, when a
// human answers "exit", or when a termination message reaches an agent that
// does not ask a human about it.
//
// Reflection summaries are produced by a background task after the exchange.
// ChatResult exposes them through a watch channel, so callers wait with a
// bounded timeout instead of sleeping.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, HumanInputMode};
use crate::error::{FastAgencyError, Result};
use crate::llm_drivers::{LlmDriver, LlmMessage};
use crate::message::{ChatMessage, IoMessage, TERMINATION_MARKER};

/// Prompt used for reflection summaries
pub const DEFAULT_SUMMARY_PROMPT: &str =
    "Summarize the takeaway from the conversation. Do not add any introductory phrases.";

/// Default bound on conversation turns
pub const DEFAULT_MAX_TURNS: usize = 10;

// ============================================================================
// Run options
// ============================================================================

/// How the conversation summary is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMethod {
    /// Content of the last message
    #[default]
    LastMsg,
    /// A separate LLM call over the whole transcript
    ReflectionWithLlm,
}

impl std::str::FromStr for SummaryMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "last_msg" => Ok(SummaryMethod::LastMsg),
            "reflection_with_llm" => Ok(SummaryMethod::ReflectionWithLlm),
            _ => Err(format!("Unknown summary method: {}", s)),
        }
    }
}

/// Options for [`Agent::run`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub summary_method: SummaryMethod,
    pub max_turns: usize,
    /// Overrides [`DEFAULT_SUMMARY_PROMPT`]
    pub summary_prompt: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            summary_method: SummaryMethod::default(),
            max_turns: DEFAULT_MAX_TURNS,
            summary_prompt: None,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary_method(mut self, method: SummaryMethod) -> Self {
        self.summary_method = method;
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.summary_prompt = Some(prompt.into());
        self
    }
}

// ============================================================================
// ChatResult
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum SummaryState {
    Pending,
    Ready(String),
    Failed(String),
}

/// Transcript of a finished conversation plus its (possibly pending) summary
#[derive(Debug, Clone)]
pub struct ChatResult {
    pub chat_id: Uuid,
    pub messages: Vec<ChatMessage>,
    /// Number of turns started
    pub turns: usize,
    summary: watch::Receiver<SummaryState>,
}

impl ChatResult {
    /// Wait for the summary, at most `timeout`
    pub async fn summary(&self, timeout: Duration) -> Result<String> {
        let mut rx = self.summary.clone();

        let wait = async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    SummaryState::Ready(summary) => return Ok(summary),
                    SummaryState::Failed(error) => {
                        return Err(FastAgencyError::SummaryUnavailable(error))
                    }
                    SummaryState::Pending => {}
                }

                if rx.changed().await.is_err() {
                    // Sender gone; take whatever it left behind
                    return match rx.borrow().clone() {
                        SummaryState::Ready(summary) => Ok(summary),
                        SummaryState::Failed(error) => Err(FastAgencyError::SummaryUnavailable(error)),
                        SummaryState::Pending => Err(FastAgencyError::SummaryUnavailable(
                            "summary task ended without a result".to_string(),
                        )),
                    };
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| FastAgencyError::SummaryTimeout(timeout))?
    }

    /// The summary if it is already available
    pub fn try_summary(&self) -> Option<String> {
        match &*self.summary.borrow() {
            SummaryState::Ready(summary) => Some(summary.clone()),
            _ => None,
        }
    }

    /// Text content of every message; messages without content yield ""
    pub fn message_contents(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.content_text()).collect()
    }

    /// Typed projection of the transcript
    pub fn io_messages(&self) -> Vec<IoMessage> {
        self.messages.iter().map(ChatMessage::to_io_message).collect()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

// ============================================================================
// Running a conversation
// ============================================================================

impl Agent {
    /// Start a conversation with `recipient` and run it to completion.
    ///
    /// The returned transcript is final; the summary may still be computing
    /// when `summary_method` is [`SummaryMethod::ReflectionWithLlm`].
    pub async fn run(
        &self,
        recipient: &Agent,
        message: impl Into<String>,
        options: RunOptions,
    ) -> Result<ChatResult> {
        self.run_with_history(recipient, Vec::new(), message, options)
            .await
    }

    /// Continue an earlier transcript with a new message from this agent
    pub async fn run_with_history(
        &self,
        recipient: &Agent,
        history: Vec<ChatMessage>,
        message: impl Into<String>,
        options: RunOptions,
    ) -> Result<ChatResult> {
        let chat_id = Uuid::now_v7();
        info!(
            chat_id = %chat_id,
            initiator = %self.name(),
            recipient = %recipient.name(),
            history = history.len(),
            max_turns = options.max_turns,
            "Starting conversation"
        );

        let mut messages = history;
        messages.push(ChatMessage::text(self.name(), recipient.name(), message));
        let mut turns = 0;

        'chat: while turns < options.max_turns {
            turns += 1;

            for (speaker, listener) in [(recipient, self), (self, recipient)] {
                match speaker.generate_reply(&messages, listener).await? {
                    Some(replies) => {
                        debug!(
                            chat_id = %chat_id,
                            turn = turns,
                            speaker = %speaker.name(),
                            count = replies.len(),
                            "Agent replied"
                        );
                        messages.extend(replies);
                    }
                    None => {
                        debug!(chat_id = %chat_id, turn = turns, speaker = %speaker.name(), "No reply, ending conversation");
                        break 'chat;
                    }
                }
            }
        }

        info!(
            chat_id = %chat_id,
            turns,
            messages = messages.len(),
            "Conversation finished"
        );

        let summary = self.start_summary(recipient, &messages, &options);

        Ok(ChatResult {
            chat_id,
            messages,
            turns,
            summary,
        })
    }

    /// Produce this agent's reply to the last message, addressed to `partner`.
    ///
    /// `None` means the agent has nothing to say and the conversation ends.
    pub async fn generate_reply(
        &self,
        messages: &[ChatMessage],
        partner: &Agent,
    ) -> Result<Option<Vec<ChatMessage>>> {
        let Some(last) = messages.last() else {
            return Ok(None);
        };

        let ask_human = match self.human_input_mode() {
            HumanInputMode::Always => true,
            HumanInputMode::Terminate => last.is_termination_msg(),
            HumanInputMode::Never => false,
        };

        if ask_human {
            let provider = self
                .human_input()
                .ok_or_else(|| FastAgencyError::HumanInputRequired {
                    agent: self.name().to_string(),
                })?;

            let prompt = format!(
                "Replying as {}. Provide feedback to {}. Press enter to skip and use auto-reply, or type 'exit' to end the conversation: ",
                self.name(),
                partner.name()
            );
            let answer = provider.get_human_input(&prompt).await?;
            let answer = answer.trim();

            if answer == "exit" {
                return Ok(None);
            }
            if !answer.is_empty() {
                return Ok(Some(vec![ChatMessage::text(
                    self.name(),
                    partner.name(),
                    answer,
                )]));
            }
        }

        if last.is_termination_msg() {
            return Ok(None);
        }

        if last.has_tool_calls() && last.sender != self.name() && self.is_executor() {
            let mut results = Vec::with_capacity(last.tool_calls.len());
            for tool_call in &last.tool_calls {
                debug!(agent = %self.name(), tool = %tool_call.name, "Executing tool call");
                let result = self.execute_tool(tool_call).await;
                results.push(ChatMessage::tool_result(self.name(), partner.name(), &result));
            }
            return Ok(Some(results));
        }

        let Some(driver) = self.driver()? else {
            return Ok(None);
        };

        let prompt = self.render_prompt(messages);
        let call_config = self.call_config().with_tools(self.llm_tools());
        let response = driver.chat_completion(prompt, &call_config).await?;

        let reply = match response.tool_calls {
            Some(tool_calls) => {
                ChatMessage::tool_calls(self.name(), partner.name(), response.text, tool_calls)
            }
            None if response.text.trim().is_empty() => return Ok(None),
            None => ChatMessage::text(self.name(), partner.name(), response.text),
        };
        Ok(Some(vec![reply]))
    }

    /// Render the transcript as this agent sees it
    fn render_prompt(&self, messages: &[ChatMessage]) -> Vec<LlmMessage> {
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        if !self.system_message().is_empty() {
            prompt.push(LlmMessage::system(self.system_message()));
        }

        let own_call_ids: HashSet<&str> = messages
            .iter()
            .filter(|m| m.sender == self.name())
            .flat_map(|m| m.tool_calls.iter().map(|tc| tc.id.as_str()))
            .collect();

        for message in messages {
            let own = message.sender == self.name();
            let answers_own_call = message
                .tool_call_id
                .as_deref()
                .map(|id| own_call_ids.contains(id))
                .unwrap_or(false);

            let rendered = if own && message.has_tool_calls() {
                LlmMessage::assistant_tool_calls(message.content_text(), message.tool_calls.clone())
            } else if own {
                LlmMessage::assistant(message.content_text())
            } else if answers_own_call {
                LlmMessage::tool_result(
                    message.tool_call_id.clone().unwrap_or_default(),
                    message.content_text(),
                )
            } else {
                LlmMessage::user(message.to_io_message().display_text())
            };
            prompt.push(rendered);
        }

        prompt
    }

    fn start_summary(
        &self,
        recipient: &Agent,
        messages: &[ChatMessage],
        options: &RunOptions,
    ) -> watch::Receiver<SummaryState> {
        let (tx, rx) = watch::channel(SummaryState::Pending);

        match options.summary_method {
            SummaryMethod::LastMsg => {
                let summary = messages
                    .iter()
                    .rev()
                    .find(|m| m.content.is_some())
                    .map(|m| m.content_text().replace(TERMINATION_MARKER, "").trim().to_string())
                    .unwrap_or_default();
                tx.send_replace(SummaryState::Ready(summary));
            }
            SummaryMethod::ReflectionWithLlm => {
                let summarizer = if self.has_llm() {
                    self.clone()
                } else {
                    recipient.clone()
                };

                if !summarizer.has_llm() {
                    tx.send_replace(SummaryState::Failed(
                        "reflection summary requires an agent with an LLM".to_string(),
                    ));
                    return rx;
                }

                let history = messages.to_vec();
                let prompt = options
                    .summary_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUMMARY_PROMPT.to_string());

                tokio::spawn(async move {
                    let state = match summarizer.reflect(&history, &prompt).await {
                        Ok(summary) => SummaryState::Ready(summary),
                        Err(e) => {
                            warn!(agent = %summarizer.name(), error = %e, "Reflection summary failed");
                            SummaryState::Failed(e.to_string())
                        }
                    };
                    tx.send_replace(state);
                });
            }
        }

        rx
    }

    async fn reflect(&self, messages: &[ChatMessage], prompt: &str) -> Result<String> {
        let driver = self
            .driver()?
            .ok_or_else(|| FastAgencyError::config("summarizing agent has no LLM"))?;

        let mut llm_messages = Vec::with_capacity(messages.len() + 2);
        if !self.system_message().is_empty() {
            llm_messages.push(LlmMessage::system(self.system_message()));
        }
        for message in messages {
            llm_messages.push(LlmMessage::user(format!(
                "{}: {}",
                message.sender,
                message.to_io_message().display_text()
            )));
        }
        llm_messages.push(LlmMessage::user(prompt));

        let response = driver.chat_completion(llm_messages, &self.call_config()).await?;
        Ok(response.text.trim().to_string())
    }
}
