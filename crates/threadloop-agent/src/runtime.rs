//! The bounded model/tool loop.
//!
//! Each iteration asks the model for the next step over the accumulating
//! working context.  Tool requests are dispatched through the
//! [`ToolRegistry`] and their results appended; a step without tool calls
//! ends the loop.  The loop never runs more than `recursion_limit` model
//! turns.
//!
//! Streaming follows the steps, not the messages: the model step emits its
//! message and the tool step emits only its last result.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::client::ModelClient;
use crate::llm::types::{ChatRequest, Message};
use crate::tools::ToolRegistry;
use crate::trace::ThreadTrace;

/// Streaming callback receiving `(role, content)` once per loop step.
///
/// The lifetime lets the callback borrow caller state.
pub type EventCallback<'a> = dyn Fn(&str, &str) + Send + Sync + 'a;

/// Role name used when a failure is streamed to the callback.
pub const ERROR_EVENT: &str = "error";

// ---------------------------------------------------------------------------
// Event emission
// ---------------------------------------------------------------------------

/// Forwards one message per step to an optional callback.
///
/// The first event of an invocation is the injected input state and is
/// never forwarded.
pub struct EventEmitter<'a> {
    callback: Option<&'a EventCallback<'a>>,
    seen: usize,
}

impl<'a> EventEmitter<'a> {
    pub fn new(callback: Option<&'a EventCallback<'a>>) -> Self {
        Self { callback, seen: 0 }
    }

    pub fn emit(&mut self, role: &str, content: &str) {
        self.seen += 1;
        if self.seen == 1 {
            return;
        }
        if let Some(cb) = self.callback {
            cb(role, content);
        }
    }

    /// Report a failure.  Always forwarded.
    pub fn error(&self, detail: &str) {
        if let Some(cb) = self.callback {
            cb(ERROR_EVENT, detail);
        }
    }

    /// Events observed so far, the suppressed one included.
    pub fn seen(&self) -> usize {
        self.seen
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Per-invocation model parameters.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub recursion_limit: u32,
}

/// How the loop ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model produced a final answer after `iterations` turns.
    Completed { iterations: u32 },
    /// `limit` turns ran without a final answer.
    LimitExceeded { limit: u32 },
}

/// Everything one run of the loop needs.
pub struct TurnLoop<'a, 'cb> {
    pub model: &'a dyn ModelClient,
    pub tools: &'a ToolRegistry,
    pub trace: ThreadTrace<'a>,
    pub emitter: &'a mut EventEmitter<'cb>,
    pub settings: &'a LoopSettings,
}

/// Run the loop over `messages`, appending every produced message.
///
/// Tool failures stay inside the loop as `Error: ...` tool results.
///
/// # Errors
///
/// Propagates model failures; the working context keeps whatever was
/// appended before the failure.
pub async fn react_loop(
    turn: TurnLoop<'_, '_>,
    messages: &mut Vec<Message>,
) -> Result<LoopOutcome> {
    let TurnLoop {
        model,
        tools,
        trace,
        emitter,
        settings,
    } = turn;
    let limit = settings.recursion_limit;
    let definitions = tools.definitions();

    debug!(limit, tool_count = definitions.len(), "starting tool loop");

    for iteration in 0..limit {
        let n = iteration + 1;
        trace.start("model_turn", &format!("iteration={n} messages={}", messages.len()));

        let request = ChatRequest {
            model: settings.model.clone(),
            messages: messages.clone(),
            tools: definitions.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            iteration_budget: limit - iteration,
        };

        let event = match model.next_turn(&request).await {
            Ok(event) => event,
            Err(e) => {
                trace.error("model_turn", &e.to_string());
                return Err(e);
            }
        };

        if event.is_final() {
            trace.end("model_turn", &event.content);
            let answer = event.into_message();
            emitter.emit(answer.role().as_str(), answer.content());
            messages.push(answer);

            info!(iterations = n, "loop completed with final answer");
            return Ok(LoopOutcome::Completed { iterations: n });
        }

        let calls = event.tool_calls.clone();
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        trace.end("model_turn", &format!("tool_calls={}", names.join(",")));
        debug!(iteration = n, tools = ?names, "model requested tool calls");

        let request_msg = event.into_message();
        emitter.emit(request_msg.role().as_str(), &request_msg.display_text());
        messages.push(request_msg);

        // Sequential, in request order.
        let mut last_result = None;
        for call in &calls {
            trace.tool_call(&call.name, &call.arguments.to_string());
            let output = tools.dispatch(&call.name, call.arguments.clone()).await;

            if output.is_error {
                warn!(tool = %call.name, error = %output.content, "tool returned an error");
                trace.error(&call.name, &output.content);
            } else {
                trace.tool_result(&call.name, &output.content);
            }

            last_result = Some(messages.len());
            messages.push(Message::tool_result(&call.id, output.content));
        }
        if let Some(idx) = last_result {
            let result = &messages[idx];
            emitter.emit(result.role().as_str(), result.content());
        }
    }

    warn!(limit, "recursion limit reached without a final answer");
    Ok(LoopOutcome::LimitExceeded { limit })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::llm::types::{Role, ToolCall, ToolDefinition, TurnEvent};
    use crate::test_support::ScriptedModel;
    use crate::tools::Tool;
    use crate::trace::{CallTracer, TraceLevel};

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "upper".into(),
                description: "Uppercase text".into(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, arguments: Value) -> crate::Result<String> {
            Ok(arguments["text"].as_str().unwrap_or_default().to_uppercase())
        }
    }

    fn settings(limit: u32) -> LoopSettings {
        LoopSettings {
            model: "m".into(),
            temperature: Some(0.0),
            max_tokens: None,
            recursion_limit: limit,
        }
    }

    fn upper_call(id: &str) -> TurnEvent {
        TurnEvent::tool_calls(vec![ToolCall::new(id, "upper", json!({"text": "hi"}))])
    }

    #[test]
    fn emitter_suppresses_first_event() {
        let seen = Mutex::new(Vec::new());
        let cb = |role: &str, content: &str| {
            seen.lock().unwrap().push(format!("{role}:{content}"));
        };
        let mut emitter = EventEmitter::new(Some(&cb));
        emitter.emit("user", "question");
        emitter.emit("assistant", "answer");
        emitter.error("boom");

        assert_eq!(emitter.seen(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["assistant:answer", "error:boom"]);
    }

    #[tokio::test]
    async fn runs_tools_then_finishes() {
        let model = ScriptedModel::new(vec![upper_call("c1"), TurnEvent::answer("HI")]);
        let tools = ToolRegistry::new();
        tools.register(Arc::new(Upper));
        let tracer = CallTracer::new();
        let settings = settings(5);
        let mut emitter = EventEmitter::new(None);
        let mut messages = vec![Message::user("shout hi")];

        let outcome = react_loop(
            TurnLoop {
                model: &model,
                tools: &tools,
                trace: tracer.scope("t"),
                emitter: &mut emitter,
                settings: &settings,
            },
            &mut messages,
        )
        .await
        .unwrap();

        assert_eq!(outcome, LoopOutcome::Completed { iterations: 2 });
        let roles: Vec<Role> = messages.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(messages[2].content(), "HI");
        assert_eq!(messages[2].tool_call_id(), Some("c1"));

        let requests = model.requests();
        assert_eq!(requests[0].iteration_budget, 5);
        assert_eq!(requests[1].iteration_budget, 4);
        assert_eq!(requests[0].tools.len(), 1);

        let levels: Vec<TraceLevel> = tracer.get_logs(Some("t")).iter().map(|e| e.level).collect();
        assert_eq!(
            levels,
            vec![
                TraceLevel::Start,
                TraceLevel::End,
                TraceLevel::ToolCall,
                TraceLevel::ToolResult,
                TraceLevel::Start,
                TraceLevel::End,
            ]
        );
    }

    #[tokio::test]
    async fn tool_step_streams_once_with_its_last_result() {
        let step = TurnEvent::tool_calls(vec![
            ToolCall::new("c1", "upper", json!({"text": "a"})),
            ToolCall::new("c2", "upper", json!({"text": "b"})),
            ToolCall::new("c3", "upper", json!({"text": "c"})),
        ]);
        let model = ScriptedModel::new(vec![step, TurnEvent::answer("ABC")]);
        let tools = ToolRegistry::new();
        tools.register(Arc::new(Upper));
        let tracer = CallTracer::new();
        let settings = settings(5);
        let seen = Mutex::new(Vec::new());
        let cb = |role: &str, content: &str| {
            seen.lock().unwrap().push((role.to_owned(), content.to_owned()));
        };
        let mut emitter = EventEmitter::new(Some(&cb));
        emitter.emit("user", "shout abc");
        let mut messages = vec![Message::user("shout abc")];

        react_loop(
            TurnLoop {
                model: &model,
                tools: &tools,
                trace: tracer.scope("t"),
                emitter: &mut emitter,
                settings: &settings,
            },
            &mut messages,
        )
        .await
        .unwrap();

        // All three results reach the context; the step streams one event.
        assert_eq!(messages.len(), 6);
        let seen = seen.into_inner().unwrap();
        let roles: Vec<&str> = seen.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(roles, vec!["assistant", "tool", "assistant"]);
        assert_eq!(seen[1].1, "C");
        assert_eq!(seen[2].1, "ABC");
    }

    #[tokio::test]
    async fn stops_at_limit() {
        let model = ScriptedModel::new(vec![upper_call("c1"), upper_call("c2"), upper_call("c3")]);
        let tools = ToolRegistry::new();
        tools.register(Arc::new(Upper));
        let tracer = CallTracer::new();
        let settings = settings(2);
        let mut emitter = EventEmitter::new(None);
        let mut messages = vec![Message::user("loop forever")];

        let outcome = react_loop(
            TurnLoop {
                model: &model,
                tools: &tools,
                trace: tracer.scope("t"),
                emitter: &mut emitter,
                settings: &settings,
            },
            &mut messages,
        )
        .await
        .unwrap();

        assert_eq!(outcome, LoopOutcome::LimitExceeded { limit: 2 });
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn zero_limit_never_calls_the_model() {
        let model = ScriptedModel::new(vec![TurnEvent::answer("unused")]);
        let tools = ToolRegistry::new();
        let tracer = CallTracer::new();
        let settings = settings(0);
        let mut emitter = EventEmitter::new(None);
        let mut messages = vec![Message::user("hi")];

        let outcome = react_loop(
            TurnLoop {
                model: &model,
                tools: &tools,
                trace: tracer.scope("t"),
                emitter: &mut emitter,
                settings: &settings,
            },
            &mut messages,
        )
        .await
        .unwrap();

        assert_eq!(outcome, LoopOutcome::LimitExceeded { limit: 0 });
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_traced_and_propagated() {
        let model = ScriptedModel::new(vec![]);
        let tools = ToolRegistry::new();
        let tracer = CallTracer::new();
        let settings = settings(3);
        let mut emitter = EventEmitter::new(None);
        let mut messages = vec![Message::user("hi")];

        let result = react_loop(
            TurnLoop {
                model: &model,
                tools: &tools,
                trace: tracer.scope("t"),
                emitter: &mut emitter,
                settings: &settings,
            },
            &mut messages,
        )
        .await;

        assert!(result.is_err());
        let logs = tracer.get_logs(Some("t"));
        assert_eq!(logs.last().unwrap().level, TraceLevel::Error);
    }
}
