//! Turn results.
//!
//! An [`InvocationResult`] is assembled from the working context of one
//! invocation and a `history_len` marker: the number of messages (system
//! prompt included) that preceded the new user message.  The message at
//! `history_len` is the question, the last message is the final answer and
//! everything strictly after the question is the turn.

use std::fmt;

use serde::Serialize;

use crate::llm::types::{Message, Role};

/// Why an invocation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The loop used up its iteration budget without a final answer.
    RecursionLimitExceeded,
    /// The model call or the orchestration itself failed.
    ExecutionError,
    /// History compaction could not produce a summary.
    SummarizationFailed,
    /// A tool reported failure.  Only ever seen in traces and tool-result
    /// text; it never ends an invocation.
    ToolError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RecursionLimitExceeded => "RecursionLimitExceeded",
            Self::ExecutionError => "ExecutionError",
            Self::SummarizationFailed => "SummarizationFailed",
            Self::ToolError => "ToolError",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Outcome of one `invoke` call.  Check `ok` before reading `final_answer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub ok: bool,
    pub question: Message,
    pub final_answer: Message,
    pub turn_messages: Vec<Message>,
    pub history_len: usize,
    pub error: Option<InvocationError>,
}

impl InvocationResult {
    /// Placeholder result for degenerate turns.
    pub fn empty() -> Self {
        Self {
            ok: true,
            question: Message::user(""),
            final_answer: Message::assistant(""),
            turn_messages: Vec::new(),
            history_len: 0,
            error: None,
        }
    }

    /// Split a working context into question, turn and final answer.
    ///
    /// Contexts of length one or less, or a marker that does not point inside
    /// the context, yield [`InvocationResult::empty`].
    pub fn assemble(messages: &[Message], history_len: usize) -> Self {
        if messages.len() <= 1 || history_len >= messages.len() {
            return Self {
                history_len,
                ..Self::empty()
            };
        }

        let question = messages[history_len].clone();
        let turn_messages = messages[history_len + 1..].to_vec();
        let final_answer = match turn_messages.last() {
            Some(last) => last.clone(),
            None => Message::assistant(""),
        };

        Self {
            ok: true,
            question,
            final_answer,
            turn_messages,
            history_len,
            error: None,
        }
    }

    /// A failed result with no turn content.
    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let mut result = Self::empty();
        result.set_error(kind, detail);
        result
    }

    /// Mark the result failed.
    pub fn set_error(&mut self, kind: ErrorKind, detail: impl Into<String>) {
        self.ok = false;
        self.error = Some(InvocationError {
            kind,
            detail: detail.into(),
        });
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// The final answer text, only when the invocation succeeded.
    pub fn answer_text(&self) -> Option<&str> {
        (self.ok && self.final_answer.role() == Role::Assistant)
            .then(|| self.final_answer.content())
    }
}

impl fmt::Display for InvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.answer_text()) {
            (Some(err), _) => write!(f, "error: {err}"),
            (None, Some(answer)) => f.write_str(answer),
            (None, None) => Ok(()),
        }
    }
}
