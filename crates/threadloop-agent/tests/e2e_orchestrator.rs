//! End-to-end tests for the agent orchestrator.
//!
//! Models are scripted in-process; tools, memory, persistence and tracing
//! are the real implementations.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use threadloop_agent::{
    AgentError, AgentOrchestrator, CallTracer, ChatRequest, ErrorKind, MemoryConfig,
    ModelClient, OrchestratorConfig, Result, Role, Summarizer, ThreadMemoryStore, Tool, ToolCall,
    ToolDefinition, TraceLevel, TurnEvent,
};
use threadloop_store::{JsonFileStore, SqliteThreadStore, ThreadLogStore};

// ── stub models ──────────────────────────────────────────────────────────────

/// Replays canned events; fails once the script runs out.
struct Scripted {
    events: Mutex<VecDeque<TurnEvent>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(events: Vec<TurnEvent>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for Scripted {
    async fn next_turn(&self, _request: &ChatRequest) -> Result<TurnEvent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::LlmRequestFailed {
                reason: "script exhausted".into(),
            })
    }
}

/// Always asks for the same tool; never finalizes.
struct AlwaysTool {
    calls: AtomicUsize,
}

#[async_trait]
impl ModelClient for AlwaysTool {
    async fn next_turn(&self, _request: &ChatRequest) -> Result<TurnEvent> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TurnEvent::tool_calls(vec![ToolCall::new(
            format!("call_{n}"),
            "read_file",
            json!({"file_path": "notes.txt"}),
        )]))
    }
}

/// Answers with the last user message after a short delay, recording how
/// many requests were in flight at once.
#[derive(Default)]
struct SlowEcho {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl ModelClient for SlowEcho {
    async fn next_turn(&self, request: &ChatRequest) -> Result<TurnEvent> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .map(|m| m.content().to_owned())
            .unwrap_or_default();
        Ok(TurnEvent::answer(format!("echo: {last_user}")))
    }
}

// ── stub tool ────────────────────────────────────────────────────────────────

struct FakeReadFile;

#[async_trait]
impl Tool for FakeReadFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"file_path": {"type": "string"}},
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        Ok(format!("contents of {}", arguments["file_path"].as_str().unwrap_or("?")))
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn memory(max_history_size: usize, summary_model: Arc<dyn ModelClient>) -> Arc<ThreadMemoryStore> {
    Arc::new(ThreadMemoryStore::new(
        MemoryConfig { max_history_size },
        Summarizer::new(summary_model, "summary-model"),
    ))
}

fn agent(model: Arc<dyn ModelClient>) -> AgentOrchestrator {
    AgentOrchestrator::new(model, memory(4096, Scripted::new(vec![])), OrchestratorConfig::default())
        .with_tools(vec![Arc::new(FakeReadFile)])
}

fn read_file_request(id: &str) -> TurnEvent {
    TurnEvent::tool_calls(vec![ToolCall::new(id, "read_file", json!({"file_path": "notes.txt"}))])
}

// ── scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_answer_stores_two_messages() {
    let orch = agent(Scripted::new(vec![TurnEvent::answer("hi there")]));

    let result = orch.invoke("t1", "hello", None, None).await;

    assert!(result.ok);
    assert_eq!(result.answer_text(), Some("hi there"));
    assert_eq!(result.question.content(), "hello");
    assert_eq!(result.turn_messages.len(), 1);

    let log = orch.memory().messages("t1").await;
    assert_eq!(log.len(), 2);
    assert_eq!((log[0].role(), log[0].content()), (Role::User, "hello"));
    assert_eq!((log[1].role(), log[1].content()), (Role::Assistant, "hi there"));
}

#[tokio::test]
async fn tool_round_trip_is_traced() {
    let orch = agent(Scripted::new(vec![
        read_file_request("c1"),
        TurnEvent::answer("the notes say hi"),
    ]));

    let result = orch.invoke("t2", "what is in notes.txt?", None, None).await;
    assert!(result.ok);

    let tool_msg = result
        .turn_messages
        .iter()
        .find(|m| m.role() == Role::Tool)
        .expect("tool result in turn messages");
    assert_eq!(tool_msg.content(), "contents of notes.txt");
    assert_eq!(tool_msg.tool_call_id(), Some("c1"));

    let logs = orch.tracer().get_logs(Some("t2"));
    let tool_entries: Vec<_> = logs
        .iter()
        .filter(|e| e.function_name == "read_file")
        .map(|e| e.level)
        .collect();
    assert_eq!(tool_entries, vec![TraceLevel::ToolCall, TraceLevel::ToolResult]);
}

#[tokio::test]
async fn recursion_limit_keeps_user_message() {
    let model = Arc::new(AlwaysTool {
        calls: AtomicUsize::new(0),
    });
    let orch = agent(model.clone());

    let result = orch.invoke("t3", "loop please", Some(1), None).await;

    assert!(!result.ok);
    assert_eq!(result.error_kind(), Some(ErrorKind::RecursionLimitExceeded));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);

    let log = orch.memory().messages("t3").await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].content(), "loop please");
}

#[tokio::test]
async fn model_turns_never_exceed_limit() {
    for limit in [0_u32, 2, 5] {
        let model = Arc::new(AlwaysTool {
            calls: AtomicUsize::new(0),
        });
        let orch = agent(model.clone());

        let result = orch.invoke("t", "go", Some(limit), None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::RecursionLimitExceeded));
        assert_eq!(model.calls.load(Ordering::SeqCst), limit as usize);
    }
}

// ── boundary and history ─────────────────────────────────────────────────────

#[tokio::test]
async fn turn_messages_exclude_prior_history() {
    let orch = agent(Scripted::new(vec![
        TurnEvent::answer("first answer"),
        read_file_request("c1"),
        TurnEvent::answer("second answer"),
    ]));

    orch.invoke("t", "first", None, None).await;
    let second = orch.invoke("t", "second", None, None).await;

    // Two prior messages, so the question sits at index 2.
    assert_eq!(second.history_len, 2);
    assert_eq!(second.question.content(), "second");
    assert_eq!(second.turn_messages.len(), 3);
    assert!(second.turn_messages.iter().all(|m| m.content() != "first answer"));
    assert_eq!(second.final_answer.content(), "second answer");

    // Intermediate tool traffic stays out of the thread log.
    let contents: Vec<String> = orch
        .memory()
        .messages("t")
        .await
        .iter()
        .map(|m| m.content().to_owned())
        .collect();
    assert_eq!(contents, vec!["first", "first answer", "second", "second answer"]);
}

#[tokio::test]
async fn threads_are_isolated() {
    let orch = agent(Scripted::new(vec![
        TurnEvent::answer("for a"),
        TurnEvent::answer("for b"),
    ]));

    orch.invoke("a", "from a", None, None).await;
    orch.invoke("b", "from b", None, None).await;

    let a = orch.memory().messages("a").await;
    assert!(a.iter().all(|m| !m.content().contains('b')));

    let b_trace = orch.tracer().get_logs(Some("b"));
    assert!(!b_trace.is_empty());
    assert!(b_trace.iter().all(|e| e.thread_id.as_deref() == Some("b")));
    assert!(b_trace.iter().all(|e| !e.params_summary.contains("from a")));
}

// ── compaction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_history_is_compacted_once_before_the_turn() {
    let summary_model = Scripted::new(vec![TurnEvent::answer("user said many things")]);
    let memory = memory(100, summary_model.clone());
    for i in 0..10 {
        memory.add_message("t", Role::User, format!("message number {i}")).await;
    }

    let orch = AgentOrchestrator::new(
        Scripted::new(vec![TurnEvent::answer("ok")]),
        memory,
        OrchestratorConfig::default(),
    );
    let result = orch.invoke("t", "continue", None, None).await;

    assert!(result.ok);
    assert_eq!(summary_model.calls(), 1);
    assert_eq!(result.history_len, 1);

    let log = orch.memory().messages("t").await;
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].role(), Role::System);
    assert!(log[0].content().starts_with("[Conversation summary of 10 earlier messages]"));
}

#[tokio::test]
async fn failed_summary_fails_the_call_without_touching_history() {
    let memory = memory(10, Scripted::new(vec![]));
    memory.add_message("t", Role::User, "long enough to need compaction").await;

    let model = Scripted::new(vec![TurnEvent::answer("unused")]);
    let orch = AgentOrchestrator::new(model.clone(), memory, OrchestratorConfig::default());
    let result = orch.invoke("t", "next", None, None).await;

    assert!(!result.ok);
    assert_eq!(result.error_kind(), Some(ErrorKind::SummarizationFailed));
    assert_eq!(model.calls(), 0);

    let log = orch.memory().messages("t").await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].content(), "long enough to need compaction");
}

// ── concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn same_thread_calls_are_serialized() {
    let model = Arc::new(SlowEcho::default());
    let orch = agent(model.clone());

    let calls = (0..4).map(|i| {
        let orch = &orch;
        async move { orch.invoke("shared", &format!("q{i}"), None, None).await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.ok));
    assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);

    // Every answer directly follows its own question.
    let log = orch.memory().messages("shared").await;
    assert_eq!(log.len(), 8);
    for pair in log.chunks(2) {
        assert_eq!(pair[1].content(), format!("echo: {}", pair[0].content()));
    }
}

#[tokio::test]
async fn different_threads_run_concurrently() {
    let model = Arc::new(SlowEcho::default());
    let orch = agent(model.clone());

    let calls = (0..4).map(|i| {
        let orch = &orch;
        async move { orch.invoke(&format!("t{i}"), "hello", None, None).await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.ok));
    assert!(model.max_in_flight.load(Ordering::SeqCst) > 1);
    assert_eq!(orch.memory().list_threads().len(), 4);
}

// ── streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn streams_one_event_per_step_into_caller_state() {
    let orch = agent(Scripted::new(vec![
        TurnEvent::tool_calls(vec![
            ToolCall::new("c1", "read_file", json!({"file_path": "a"})),
            ToolCall::new("c2", "read_file", json!({"file_path": "b"})),
            ToolCall::new("c3", "read_file", json!({"file_path": "c"})),
        ]),
        TurnEvent::answer("read all three"),
    ]));

    let mut transcript = Vec::new();
    {
        let sink = Mutex::new(&mut transcript);
        let on_event = |role: &str, content: &str| {
            sink.lock().unwrap().push(format!("{role}: {content}"));
        };
        let result = orch.invoke("s", "read a, b and c", None, Some(&on_event)).await;
        assert!(result.ok);
        assert_eq!(result.turn_messages.len(), 5);
    }

    // The input is never echoed; the tool step shows its last result.
    assert_eq!(transcript.len(), 3);
    assert!(transcript[0].starts_with("assistant: [tool_call: read_file("));
    assert_eq!(transcript[1], "tool: contents of c");
    assert_eq!(transcript[2], "assistant: read all three");
}

#[tokio::test]
async fn failure_is_streamed_as_an_error_event() {
    let orch = agent(Scripted::new(vec![]));
    let errors = Mutex::new(Vec::new());
    let on_event = |role: &str, content: &str| {
        errors.lock().unwrap().push((role.to_owned(), content.to_owned()));
    };

    let result = orch.invoke("s", "hi", None, Some(&on_event)).await;
    assert!(!result.ok);

    let errors = errors.into_inner().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "error");
}

// ── tracing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_dispatch_has_a_closing_entry() {
    let orch = agent(Scripted::new(vec![
        TurnEvent::tool_calls(vec![
            ToolCall::new("c1", "read_file", json!({"file_path": "a"})),
            ToolCall::new("c2", "nonexistent", json!({})),
            ToolCall::new("c3", "read_file", json!({"wrong": 1})),
        ]),
        TurnEvent::answer("done"),
    ]));

    let result = orch.invoke("t", "go", None, None).await;
    assert!(result.ok);

    let logs = orch.tracer().get_logs(Some("t"));
    let mut open: Option<&str> = None;
    let mut dispatches = 0;
    for entry in &logs {
        match entry.level {
            TraceLevel::ToolCall => {
                assert!(open.is_none());
                open = Some(entry.function_name.as_str());
                dispatches += 1;
            }
            TraceLevel::ToolResult | TraceLevel::Error if open.is_some() => {
                assert_eq!(open.take(), Some(entry.function_name.as_str()));
            }
            _ => {}
        }
    }
    assert!(open.is_none());
    assert_eq!(dispatches, 3);

    let errors = logs
        .iter()
        .filter(|e| e.level == TraceLevel::Error)
        .count();
    assert_eq!(errors, 2);
}

#[tokio::test]
async fn trace_buffer_is_capped() {
    let tracer = Arc::new(CallTracer::new());
    let answers = (0..260).map(|_| TurnEvent::answer("ok")).collect();
    let orch = AgentOrchestrator::new(
        Scripted::new(answers),
        memory(usize::MAX, Scripted::new(vec![])),
        OrchestratorConfig::default(),
    )
    .with_tracer(tracer.clone());

    // Four entries per direct answer: invoke start/end and one model turn.
    for i in 0..260 {
        orch.invoke("t", &format!("q{i}"), None, None).await;
    }

    let logs = tracer.get_logs(Some("t"));
    assert_eq!(logs.len(), 1000);
    // The 40 oldest entries (ten whole invocations) were dropped.
    assert_eq!(logs[0].function_name, "agent_invoke");
    assert_eq!(logs[0].level, TraceLevel::Start);
    assert_eq!(logs[0].params_summary, "q10");
    assert_eq!(logs.last().map(|e| e.level), Some(TraceLevel::End));
}

// ── persistence ──────────────────────────────────────────────────────────────

async fn assert_save_load_identity(backend: Arc<dyn ThreadLogStore>) {
    let memory = Arc::new(
        ThreadMemoryStore::new(
            MemoryConfig::default(),
            Summarizer::new(Scripted::new(vec![]), ""),
        )
        .with_persistence(backend),
    );
    let orch = AgentOrchestrator::new(
        Scripted::new(vec![read_file_request("c1"), TurnEvent::answer("réponse ✓")]),
        memory.clone(),
        OrchestratorConfig::default(),
    )
    .with_tools(vec![Arc::new(FakeReadFile)]);

    assert!(orch.invoke("persisted", "question ✓", None, None).await.ok);
    let before = memory.messages("persisted").await;
    // Tool steps stay out of the log, so every stored message is plain.
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|m| m.tool_calls().is_empty() && m.tool_call_id().is_none()));
    orch.save_thread("persisted").await.unwrap();

    memory.clear("persisted");
    memory.load("persisted").await.unwrap();
    assert_eq!(memory.messages("persisted").await, before);

    assert!(orch.forget_thread("persisted").await.unwrap());
    assert!(memory.list_saved().await.unwrap().is_empty());
    assert!(memory.list_threads().is_empty());
}

#[tokio::test]
async fn save_then_load_reproduces_log_json() {
    let dir = tempfile::tempdir().unwrap();
    assert_save_load_identity(Arc::new(JsonFileStore::open(dir.path()).unwrap())).await;
}

#[tokio::test]
async fn save_then_load_reproduces_log_sqlite() {
    let db = threadloop_store::Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();
    assert_save_load_identity(Arc::new(SqliteThreadStore::new(db))).await;
}
