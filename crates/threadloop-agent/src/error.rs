//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].  Errors that
//! end an invocation are folded into an [`crate::InvocationResult`] by the
//! orchestrator rather than returned to the caller.

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the model provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The model response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// The configured provider is not one this client can talk to.
    #[error("unsupported model provider: {provider}")]
    UnsupportedProvider { provider: String },

    // -- Tool errors ---------------------------------------------------------
    /// A tool invocation failed.  Inside the loop this becomes tool-result
    /// text; it only propagates when a tool is called directly.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    // -- Memory errors -------------------------------------------------------
    /// Compaction could not produce a summary.
    #[error("summarization failed: {reason}")]
    SummarizationFailed { reason: String },

    /// `save`/`load` was requested on a store without a persistence backend.
    #[error("no persistence backend configured")]
    PersistenceUnavailable,

    /// A persisted message could not be turned back into a [`crate::Message`].
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// A persistence backend failed.
    #[error("store error: {0}")]
    Store(#[from] threadloop_store::StoreError),

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}
