//! The agent orchestrator.
//!
//! [`AgentOrchestrator::invoke`] executes one user turn on one thread:
//!
//! 1. Read the thread history (compacting it if needed).
//! 2. Build the working context: system prompt, history, new user message.
//! 3. Append the user message to the thread log.
//! 4. Run the bounded tool loop.
//! 5. Append the final answer to the thread log and assemble the result.
//!
//! Invocations on the same thread id are serialized; different thread ids
//! run concurrently.  A thread's turn lock lives only while some call holds
//! or awaits it.  Failures never escape as errors: they come back as an
//! [`InvocationResult`] with `ok == false`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::llm::client::ModelClient;
use crate::llm::types::Message;
use crate::memory::ThreadMemoryStore;
use crate::result::{ErrorKind, InvocationResult};
use crate::runtime::{EventCallback, EventEmitter, LoopOutcome, LoopSettings, TurnLoop, react_loop};
use crate::tools::{Tool, ToolRegistry};
use crate::trace::{CallTracer, ThreadTrace};

const INVOKE_SPAN: &str = "agent_invoke";

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Fixed system prompt placed before the history, if any.
    pub system_prompt: Option<String>,
    /// Default loop bound when `invoke` is not given one.
    pub recursion_limit: u32,
    /// Model identifier; empty uses the client default.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            recursion_limit: 10,
            model: String::new(),
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

/// Composes model, tools, memory and tracing into single-turn invocations.
pub struct AgentOrchestrator {
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    memory: Arc<ThreadMemoryStore>,
    tracer: Arc<CallTracer>,
    config: OrchestratorConfig,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        memory: Arc<ThreadMemoryStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            tools: ToolRegistry::new(),
            memory,
            tracer: Arc::new(CallTracer::new()),
            config,
            turn_locks: DashMap::new(),
        }
    }

    /// Register `tools` on construction.
    pub fn with_tools(self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.set_tools(tools);
        self
    }

    /// Share an existing tracer.
    pub fn with_tracer(mut self, tracer: Arc<CallTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    // -- Tool management ------------------------------------------------------

    pub fn add_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    pub fn remove_tool(&self, name: &str) -> bool {
        self.tools.unregister(name)
    }

    pub fn set_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        self.tools.set_tools(tools);
    }

    pub fn list_tools(&self) -> Vec<String> {
        self.tools.list_tools()
    }

    // -- Accessors ------------------------------------------------------------

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn memory(&self) -> &Arc<ThreadMemoryStore> {
        &self.memory
    }

    pub fn tracer(&self) -> &Arc<CallTracer> {
        &self.tracer
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Persist one thread's log.
    pub async fn save_thread(&self, thread_id: &str) -> Result<()> {
        self.memory.save(thread_id).await
    }

    /// Clear a thread's resident log and trace once no turn is running on it.
    pub async fn clear_thread(&self, thread_id: &str) {
        let lock = self.turn_lock(thread_id);
        {
            let _turn = lock.lock().await;
            self.memory.clear(thread_id);
            self.tracer.clear_logs(Some(thread_id));
        }
        self.release_turn_lock(thread_id, lock);
    }

    /// Like [`clear_thread`](Self::clear_thread), and also delete the
    /// persisted copy.  Returns whether a persisted copy existed.
    pub async fn forget_thread(&self, thread_id: &str) -> Result<bool> {
        let lock = self.turn_lock(thread_id);
        let removed = {
            let _turn = lock.lock().await;
            self.tracer.clear_logs(Some(thread_id));
            self.memory.forget(thread_id).await
        };
        self.release_turn_lock(thread_id, lock);
        removed
    }

    fn turn_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.turn_locks.entry(thread_id.to_owned()).or_default())
    }

    /// Drop our handle and remove the map entry if nobody else holds it.
    fn release_turn_lock(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.turn_locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    // -- Invocation -----------------------------------------------------------

    /// Execute one user turn on `thread_id`.
    ///
    /// `recursion_limit` overrides the configured bound for this call.
    /// `on_event` receives `(role, content)` once per step after the injected
    /// input, and `("error", detail)` if the call fails.
    pub async fn invoke(
        &self,
        thread_id: &str,
        user_input: &str,
        recursion_limit: Option<u32>,
        on_event: Option<&EventCallback<'_>>,
    ) -> InvocationResult {
        let lock = self.turn_lock(thread_id);
        let result = {
            let _turn = lock.lock().await;
            self.run_turn(thread_id, user_input, recursion_limit, on_event)
                .await
        };
        self.release_turn_lock(thread_id, lock);
        result
    }

    async fn run_turn(
        &self,
        thread_id: &str,
        user_input: &str,
        recursion_limit: Option<u32>,
        on_event: Option<&EventCallback<'_>>,
    ) -> InvocationResult {
        let limit = recursion_limit.unwrap_or(self.config.recursion_limit);
        let trace = self.tracer.scope(thread_id);
        let mut emitter = EventEmitter::new(on_event);

        trace.start(INVOKE_SPAN, user_input);
        info!(thread_id, limit, "invoking agent");

        let history = match self.memory.get_history(thread_id).await {
            Ok(history) => history,
            Err(e) => {
                let kind = match &e {
                    AgentError::SummarizationFailed { .. } => ErrorKind::SummarizationFailed,
                    _ => ErrorKind::ExecutionError,
                };
                return fail(InvocationResult::empty(), kind, &e.to_string(), trace, &emitter);
            }
        };

        let mut messages = Vec::with_capacity(history.len() + 4);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(Message::system(prompt.as_str()));
        }
        messages.extend(history);
        let history_len = messages.len();

        let question = Message::user(user_input);
        self.memory.push(thread_id, question.clone()).await;
        emitter.emit(question.role().as_str(), question.content());
        messages.push(question);

        let settings = LoopSettings {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            recursion_limit: limit,
        };

        let outcome = react_loop(
            TurnLoop {
                model: self.model.as_ref(),
                tools: &self.tools,
                trace,
                emitter: &mut emitter,
                settings: &settings,
            },
            &mut messages,
        )
        .await;

        let result = InvocationResult::assemble(&messages, history_len);
        match outcome {
            Ok(LoopOutcome::Completed { iterations }) => {
                self.memory.push(thread_id, result.final_answer.clone()).await;
                trace.end(INVOKE_SPAN, result.final_answer.content());
                info!(thread_id, iterations, "invocation completed");
                result
            }
            Ok(LoopOutcome::LimitExceeded { limit }) => {
                let detail = format!("recursion limit of {limit} reached without a final answer");
                fail(result, ErrorKind::RecursionLimitExceeded, &detail, trace, &emitter)
            }
            Err(e) => fail(result, ErrorKind::ExecutionError, &e.to_string(), trace, &emitter),
        }
    }
}

fn fail(
    mut result: InvocationResult,
    kind: ErrorKind,
    detail: &str,
    trace: ThreadTrace<'_>,
    emitter: &EventEmitter<'_>,
) -> InvocationResult {
    warn!(%kind, detail, "invocation failed");
    trace.error(INVOKE_SPAN, &format!("{kind}: {detail}"));
    emitter.error(detail);
    result.set_error(kind, detail);
    result
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("tools", &self.tools)
            .field("memory", &self.memory)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
