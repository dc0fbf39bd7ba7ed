// Transcript assertions
//
// Checks that a conversation transcript and its summary mention what a live
// task should have found. Summary checks ignore case; message checks are
// plain substring matches over each message's content.

use fastagency_core::ChatResult;
use std::time::Duration;
use thiserror::Error;

/// Why a transcript did not meet its expectation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptMismatch {
    #[error("summary does not contain '{expected}': {summary:?}")]
    SummaryMissing { expected: String, summary: String },

    #[error("no message contains '{expected}' ({count} messages checked)")]
    MessageMissing { expected: String, count: usize },

    #[error("summary unavailable: {0}")]
    SummaryUnavailable(String),
}

/// Substrings a transcript must contain
#[derive(Debug, Clone, Default)]
pub struct TranscriptExpectation {
    summary_contains: Vec<String>,
    message_contains: Vec<String>,
}

impl TranscriptExpectation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `text` in the summary, ignoring case
    pub fn summary_contains(mut self, text: impl Into<String>) -> Self {
        self.summary_contains.push(text.into());
        self
    }

    /// Require `text` in at least one message
    pub fn message_contains(mut self, text: impl Into<String>) -> Self {
        self.message_contains.push(text.into());
        self
    }

    /// Check messages and summary, reporting the first unmet requirement
    pub fn check<S: AsRef<str>>(&self, messages: &[S], summary: &str) -> Result<(), TranscriptMismatch> {
        let summary_lower = summary.to_lowercase();
        for expected in &self.summary_contains {
            if !summary_lower.contains(&expected.to_lowercase()) {
                return Err(TranscriptMismatch::SummaryMissing {
                    expected: expected.clone(),
                    summary: summary.to_string(),
                });
            }
        }

        for expected in &self.message_contains {
            if !messages.iter().any(|m| m.as_ref().contains(expected.as_str())) {
                return Err(TranscriptMismatch::MessageMissing {
                    expected: expected.clone(),
                    count: messages.len(),
                });
            }
        }

        Ok(())
    }

    /// Wait up to `timeout` for the chat's summary, then check
    pub async fn check_chat(&self, chat: &ChatResult, timeout: Duration) -> Result<(), TranscriptMismatch> {
        let summary = chat
            .summary(timeout)
            .await
            .map_err(|e| TranscriptMismatch::SummaryUnavailable(e.to_string()))?;
        self.check(&chat.message_contents(), &summary)
    }
}

/// Run a check that is expected to fail sometimes.
///
/// A failure is logged as a tolerated expected failure and yields `None`;
/// a success is logged as an unexpected pass.
pub fn tolerate_flaky<T, E: std::fmt::Display>(name: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => {
            tracing::info!(test = %name, "XPASS: expected-failure check passed");
            Some(value)
        }
        Err(e) => {
            tracing::warn!(test = %name, error = %e, "XFAIL: tolerated expected failure");
            None
        }
    }
}
