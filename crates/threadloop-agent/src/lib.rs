//! Agent runtime for threadloop.
//!
//! For each conversation thread the runtime drives a bounded loop that asks
//! a model for the next step and runs the tools it requests, until the model
//! answers or the iteration cap is hit.  It also owns thread memory (with
//! compaction) and a per-thread call trace.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────┐
//!  invoke ───────>│ AgentOrchestrator  │──── CallTracer (per thread)
//!                 └──┬──────────────┬──┘
//!                    │              │
//!          ┌─────────┴──────┐   ┌───┴──────────────┐
//!          │ ThreadMemory   │   │ react_loop       │
//!          │ Store          │   │  ModelClient     │
//!          │  └ Summarizer  │   │  ToolRegistry    │
//!          └───────┬────────┘   └──────────────────┘
//!                  │
//!          ThreadLogStore (threadloop-store)
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Message types, the `ModelClient` trait and the HTTP client.
//! - [`tools`] -- The `Tool` trait and the concurrent registry.
//! - [`compaction`] -- Size predicate and the summarizer.
//! - [`memory`] -- Per-thread message logs.
//! - [`trace`] -- Per-thread call tracing.
//! - [`runtime`] -- The bounded model/tool loop.
//! - [`orchestrator`] -- Single-turn invocation.
//! - [`result`] -- Invocation results and the error taxonomy.
//! - [`config`] -- Profile-based TOML settings.
//! - [`error`] -- Agent error types.

pub mod compaction;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod result;
pub mod runtime;
pub mod tools;
pub mod trace;

#[cfg(test)]
mod test_support;

// Re-export the most commonly used types at the crate root.
pub use compaction::{Summarizer, history_size, needs_compaction};
pub use config::{AgentSettings, ModelSettings, PersistenceBackend, Profile};
pub use error::{AgentError, Result};
pub use llm::{
    ChatRequest, LlmClient, LlmClientConfig, Message, ModelClient, Role, ToolCall,
    ToolDefinition, TurnEvent,
};
pub use memory::{MemoryConfig, ThreadMemoryStore};
pub use orchestrator::{AgentOrchestrator, OrchestratorConfig};
pub use result::{ErrorKind, InvocationError, InvocationResult};
pub use runtime::{EventCallback, LoopOutcome};
pub use tools::{Tool, ToolOutput, ToolRegistry};
pub use trace::{CallTracer, TraceEntry, TraceLevel};
