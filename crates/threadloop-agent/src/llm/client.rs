//! Model client trait and the OpenAI-compatible HTTP implementation.
//!
//! [`LlmClient`] speaks the **OpenAI Chat Completions API**, which also
//! covers compatible endpoints such as Ollama, vLLM and DeepSeek.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::llm::types::{ChatRequest, Message, Role, ToolCall, ToolDefinition, TurnEvent};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default per-request HTTP timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Anything that can produce the next step of a conversation.
///
/// Implementations are shared across threads and must be safe to call
/// concurrently.  Calling [`ModelClient::next_turn`] repeatedly over an
/// accumulating context yields the stream of turn events for one invocation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Ask the model for the next step over `request.messages`.
    async fn next_turn(&self, request: &ChatRequest) -> Result<TurnEvent>;
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// API key for bearer authentication.  May be empty for local servers.
    pub api_key: String,
    /// Base URL for the API (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Model used when a request leaves `model` empty.
    pub default_model: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::openai_compatible(api_key, model, OPENAI_BASE_URL)
    }

    /// Create a configuration for any OpenAI-compatible API.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            default_model: model.into(),
            max_tokens: 4096,
        }
    }

    /// Local servers (Ollama, vLLM on loopback) accept requests without a key.
    fn is_local(&self) -> bool {
        ["://localhost", "://127.0.0.1", "://[::1]"]
            .iter()
            .any(|host| self.base_url.contains(host))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the OpenAI Chat Completions API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() && !config.is_local() {
            return Err(AgentError::MissingApiKey {
                provider: "openai".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// The model used when requests do not name one.
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Build the JSON body for the Chat Completions API.
    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let model = if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        };

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages_to_openai(&request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(&request.tools);
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut headers = HeaderMap::new();
        if !self.config.api_key.is_empty() {
            let auth_value = format!("Bearer {}", self.config.api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|e| AgentError::LlmRequestFailed {
                    reason: format!("invalid authorization header: {e}"),
                })?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], "sending LLM request");

        self.http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn next_turn(&self, request: &ChatRequest) -> Result<TurnEvent> {
        let body = self.build_request_body(request);
        let resp = self.send(&body).await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        parse_openai_response(&v)
    }
}

// ===========================================================================
// Wire format conversion
// ===========================================================================

/// Convert messages into the Chat Completions wire format.
///
/// Tool calls live in `assistant.tool_calls` with stringified arguments and
/// tool results use `role: "tool"` with a `tool_call_id`.
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role() {
            Role::Assistant if !msg.tool_calls().is_empty() => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls()
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();

                let mut m = json!({
                    "role": "assistant",
                    "tool_calls": tool_calls,
                });
                if !msg.content().is_empty() {
                    m["content"] = json!(msg.content());
                }
                m
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id(),
                "content": msg.content(),
            }),
            role => json!({
                "role": role.as_str(),
                "content": msg.content(),
            }),
        })
        .collect()
}

/// Convert tool definitions into `{"type": "function", "function": {...}}`.
pub fn tools_to_openai(tools: &[ToolDefinition]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a Chat Completions response into a [`TurnEvent`].
pub fn parse_openai_response(v: &Value) -> Result<TurnEvent> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    let content = message["content"].as_str().unwrap_or_default().to_owned();

    let calls = match message["tool_calls"].as_array() {
        Some(arr) => arr
            .iter()
            .map(|tc| {
                let func = &tc["function"];
                let name = func["name"].as_str().unwrap_or_default().to_owned();
                let args_str = func["arguments"].as_str().unwrap_or("{}");
                let arguments: Value = if args_str.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(args_str).map_err(|e| AgentError::LlmParseFailed {
                        reason: format!("invalid JSON in tool call `{name}` arguments: {e}"),
                    })?
                };

                let id = match tc["id"].as_str() {
                    Some(id) if !id.is_empty() => id.to_owned(),
                    _ => format!("call_{}", Uuid::now_v7().simple()),
                };

                Ok(ToolCall { id, name, arguments })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(TurnEvent {
        role: Role::Assistant,
        content,
        tool_calls: calls,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
