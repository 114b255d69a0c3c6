//! Model integration layer.
//!
//! - [`types`] -- Core data types (messages, tool calls, turn events).
//! - [`client`] -- The [`ModelClient`] trait and the OpenAI-compatible
//!   HTTP client.

pub mod client;
pub mod types;

pub use client::{LlmClient, LlmClientConfig, ModelClient};
pub use types::{ChatRequest, Message, Role, ToolCall, ToolDefinition, TurnEvent};
