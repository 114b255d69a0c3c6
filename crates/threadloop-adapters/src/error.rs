//! Adapter error types.
//!
//! Tools report failures through [`AdapterError`]; the registry turns them
//! into `Error: ...` text for the model.

use threadloop_agent::AgentError;

/// Unified error type for the built-in tools.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The arguments supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// A tool invocation failed.
    #[error("execution failed for tool `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    /// Attach the tool name to errors that do not already carry one.
    pub fn into_agent_error(self, tool_name: &str) -> AgentError {
        let (tool_name, reason) = match self {
            Self::InvalidParams { tool_name, reason } => (tool_name, reason),
            Self::ExecutionFailed { tool_name, reason } => (tool_name, reason),
            other => (tool_name.to_owned(), other.to_string()),
        };
        AgentError::ToolExecutionFailed { tool_name, reason }
    }
}
