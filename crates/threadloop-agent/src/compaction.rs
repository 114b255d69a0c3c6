//! Compaction policy and the summarizer that backs it.
//!
//! A thread log is compacted once its size (role names plus content, counted
//! in Unicode scalar values) grows strictly past the configured maximum.
//! Compaction hands the **entire** log to the [`Summarizer`] and replaces it
//! with one system message built by [`summary_message`].

use std::sync::Arc;

use tracing::debug;

use crate::error::{AgentError, Result};
use crate::llm::client::ModelClient;
use crate::llm::types::{ChatRequest, Message, Role};

/// Default cap on tokens the summary model may generate.
const SUMMARY_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// Size predicate
// ---------------------------------------------------------------------------

/// Aggregate size of a log: role name length plus content length per message.
pub fn history_size(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| m.role().as_str().chars().count() + m.content().chars().count())
        .sum()
}

/// `true` when the log is larger than `max_history_size`.
pub fn needs_compaction(messages: &[Message], max_history_size: usize) -> bool {
    history_size(messages) > max_history_size
}

/// Build the single message that replaces a compacted log.
pub fn summary_message(original_len: usize, summary: &str) -> Message {
    Message::system(format!(
        "[Conversation summary of {original_len} earlier messages]\n{summary}"
    ))
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Compresses a message log into summary text with a dedicated model.
///
/// The summarizer has no side effects; the memory store performs the
/// replacement.
#[derive(Clone)]
pub struct Summarizer {
    model: Arc<dyn ModelClient>,
    model_name: String,
    max_tokens: u32,
}

impl Summarizer {
    /// `model_name` may be empty to use the client's default model.
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            max_tokens: SUMMARY_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Summarize `messages`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::SummarizationFailed`] if the model call fails,
    /// the model asks for tools, or the summary comes back empty.
    pub async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let prompt = format!(
            "Summarize the following conversation concisely, preserving key facts, decisions, \
             tool results, and context needed to continue the conversation. Be factual and brief.\n\n\
             {}",
            format_messages_for_summary(messages)
        );

        let mut request = ChatRequest::new(vec![Message::user(prompt)]);
        request.model = self.model_name.clone();
        request.temperature = Some(0.0);
        request.max_tokens = Some(self.max_tokens);

        debug!(
            model = %self.model_name,
            messages = messages.len(),
            "requesting conversation summary"
        );

        let event = self
            .model
            .next_turn(&request)
            .await
            .map_err(|e| AgentError::SummarizationFailed {
                reason: e.to_string(),
            })?;

        if !event.is_final() {
            return Err(AgentError::SummarizationFailed {
                reason: "summary model requested tool calls".into(),
            });
        }

        let summary = event.content.trim();
        if summary.is_empty() {
            return Err(AgentError::SummarizationFailed {
                reason: "summary model returned empty text".into(),
            });
        }

        debug!(summary_len = summary.len(), "received conversation summary");
        Ok(summary.to_owned())
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("model_name", &self.model_name)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

/// Render messages as a plain transcript for the summary prompt.
pub fn format_messages_for_summary(messages: &[Message]) -> String {
    let mut buf = String::with_capacity(messages.len() * 200);
    for msg in messages {
        let role_label = match msg.role() {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };

        buf.push_str(role_label);
        buf.push_str(": ");
        buf.push_str(msg.content());

        for tc in msg.tool_calls() {
            buf.push_str(&format!("\n  [tool_call: {}({})]", tc.name, tc.arguments));
        }

        buf.push('\n');
    }
    buf
}
