//! Per-thread call tracing.
//!
//! [`CallTracer`] keeps a queryable record of loop iterations and tool
//! dispatches.  Entries are partitioned by thread id so concurrent
//! invocations never interleave; entries without a thread id go to a
//! separate global scope.  Every scope is a FIFO ring that drops its oldest
//! entry once it reaches capacity.
//!
//! Recording never blocks on I/O and never fails.  Each entry is also
//! mirrored to `tracing` at debug level.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Default number of entries retained per scope.
pub const DEFAULT_TRACE_CAPACITY: usize = 1000;

/// Maximum characters kept from a parameter summary.
pub const MAX_PARAMS_CHARS: usize = 100;

/// Maximum characters kept from a result summary.
pub const MAX_RESULT_CHARS: usize = 200;

/// Source label used by the orchestrator.
pub const DEFAULT_SOURCE: &str = "agent";

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    Start,
    End,
    Error,
    ToolCall,
    ToolResult,
}

impl TraceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Error => "error",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub level: TraceLevel,
    pub function_name: String,
    pub params_summary: String,
    pub result_summary: String,
    pub source: String,
    pub thread_id: Option<String>,
}

impl TraceEntry {
    pub fn new(level: TraceLevel, function_name: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            function_name: function_name.into(),
            params_summary: String::new(),
            result_summary: String::new(),
            source: DEFAULT_SOURCE.to_owned(),
            thread_id: None,
        }
    }

    /// Attach a parameter summary, truncated to [`MAX_PARAMS_CHARS`].
    pub fn params(mut self, params: &str) -> Self {
        self.params_summary = truncate(params, MAX_PARAMS_CHARS);
        self
    }

    /// Attach a result summary, truncated to [`MAX_RESULT_CHARS`].
    pub fn result(mut self, result: &str) -> Self {
        self.result_summary = truncate(result, MAX_RESULT_CHARS);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.function_name
        )?;
        if !self.params_summary.is_empty() {
            write!(f, " params={}", self.params_summary)?;
        }
        if !self.result_summary.is_empty() {
            write!(f, " result={}", self.result_summary)?;
        }
        Ok(())
    }
}

/// Keep at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Capacity-bounded trace log, partitioned per thread id.
#[derive(Debug)]
pub struct CallTracer {
    capacity: usize,
    threads: DashMap<String, VecDeque<TraceEntry>>,
    global: Mutex<VecDeque<TraceEntry>>,
}

impl Default for CallTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTracer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            threads: DashMap::new(),
            global: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry to the scope named by its thread id.
    pub fn record(&self, entry: TraceEntry) {
        tracing::debug!(
            target: "threadloop::trace",
            level = %entry.level,
            function = %entry.function_name,
            thread = entry.thread_id.as_deref().unwrap_or("-"),
            params = %entry.params_summary,
            result = %entry.result_summary,
            "trace"
        );

        match entry.thread_id.clone() {
            Some(thread_id) => {
                let mut ring = self.threads.entry(thread_id).or_default();
                push_bounded(&mut ring, entry, self.capacity);
            }
            None => push_bounded(&mut self.global(), entry, self.capacity),
        }
    }

    /// Convenience form of [`CallTracer::record`] taking each field separately.
    pub fn log(
        &self,
        level: TraceLevel,
        function_name: &str,
        params: Option<&str>,
        result: Option<&str>,
        source: Option<&str>,
        thread_id: Option<&str>,
    ) {
        let mut entry = TraceEntry::new(level, function_name);
        if let Some(p) = params {
            entry = entry.params(p);
        }
        if let Some(r) = result {
            entry = entry.result(r);
        }
        if let Some(s) = source {
            entry = entry.source(s);
        }
        if let Some(t) = thread_id {
            entry = entry.thread(t);
        }
        self.record(entry);
    }

    /// Entries of one thread, or of the global scope when `None`, oldest first.
    pub fn get_logs(&self, thread_id: Option<&str>) -> Vec<TraceEntry> {
        match thread_id {
            Some(id) => self
                .threads
                .get(id)
                .map(|ring| ring.iter().cloned().collect())
                .unwrap_or_default(),
            None => self.global().iter().cloned().collect(),
        }
    }

    /// Drop the entries of one thread, or of the global scope when `None`.
    pub fn clear_logs(&self, thread_id: Option<&str>) {
        match thread_id {
            Some(id) => {
                self.threads.remove(id);
            }
            None => self.global().clear(),
        }
    }

    /// Thread ids that currently hold entries, sorted.
    pub fn threads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .threads
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// A recorder bound to one thread id.
    pub fn scope<'a>(&'a self, thread_id: &'a str) -> ThreadTrace<'a> {
        ThreadTrace {
            tracer: self,
            thread_id,
        }
    }

    fn global(&self) -> MutexGuard<'_, VecDeque<TraceEntry>> {
        self.global.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn push_bounded(ring: &mut VecDeque<TraceEntry>, entry: TraceEntry, capacity: usize) {
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(entry);
}

// ---------------------------------------------------------------------------
// Thread-scoped recorder
// ---------------------------------------------------------------------------

/// Records entries for a single thread id.
#[derive(Debug, Clone, Copy)]
pub struct ThreadTrace<'a> {
    tracer: &'a CallTracer,
    thread_id: &'a str,
}

impl ThreadTrace<'_> {
    fn emit(&self, level: TraceLevel, function_name: &str, params: &str, result: &str) {
        self.tracer.record(
            TraceEntry::new(level, function_name)
                .params(params)
                .result(result)
                .thread(self.thread_id),
        );
    }

    pub fn start(&self, function_name: &str, params: &str) {
        self.emit(TraceLevel::Start, function_name, params, "");
    }

    pub fn end(&self, function_name: &str, result: &str) {
        self.emit(TraceLevel::End, function_name, "", result);
    }

    pub fn error(&self, function_name: &str, detail: &str) {
        self.emit(TraceLevel::Error, function_name, "", detail);
    }

    pub fn tool_call(&self, tool_name: &str, arguments: &str) {
        self.emit(TraceLevel::ToolCall, tool_name, arguments, "");
    }

    pub fn tool_result(&self, tool_name: &str, result: &str) {
        self.emit(TraceLevel::ToolResult, tool_name, "", result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn entries_are_partitioned_by_thread() {
        let tracer = CallTracer::new();
        tracer.scope("a").start("model_turn", "iteration=1");
        tracer.scope("b").tool_call("read_file", "{}");
        tracer.log(TraceLevel::End, "boot", None, Some("ok"), Some("cli"), None);

        assert_eq!(tracer.get_logs(Some("a")).len(), 1);
        assert_eq!(tracer.get_logs(Some("b"))[0].level, TraceLevel::ToolCall);
        let global = tracer.get_logs(None);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].source, "cli");
        assert_eq!(tracer.threads(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn ring_drops_oldest_first() {
        let tracer = CallTracer::with_capacity(3);
        for i in 0..5 {
            tracer.scope("t").start(&format!("f{i}"), "");
        }
        let names: Vec<String> = tracer
            .get_logs(Some("t"))
            .into_iter()
            .map(|e| e.function_name)
            .collect();
        assert_eq!(names, vec!["f2", "f3", "f4"]);
    }

    #[test]
    fn default_capacity_is_enforced() {
        let tracer = CallTracer::new();
        for _ in 0..(DEFAULT_TRACE_CAPACITY + 25) {
            tracer.log(TraceLevel::Start, "f", None, None, None, None);
        }
        assert_eq!(tracer.get_logs(None).len(), DEFAULT_TRACE_CAPACITY);
    }

    #[test]
    fn summaries_are_truncated() {
        let tracer = CallTracer::new();
        let long = "x".repeat(500);
        tracer.log(TraceLevel::ToolResult, "f", Some(&long), Some(&long), None, Some("t"));

        let entry = &tracer.get_logs(Some("t"))[0];
        assert_eq!(entry.params_summary.chars().count(), MAX_PARAMS_CHARS + 3);
        assert_eq!(entry.result_summary.chars().count(), MAX_RESULT_CHARS + 3);
    }

    #[test]
    fn clear_logs_only_touches_one_scope() {
        let tracer = CallTracer::new();
        tracer.scope("a").start("f", "");
        tracer.scope("b").start("f", "");
        tracer.clear_logs(Some("a"));

        assert!(tracer.get_logs(Some("a")).is_empty());
        assert_eq!(tracer.get_logs(Some("b")).len(), 1);
        assert_eq!(tracer.threads(), vec!["b".to_owned()]);
    }
}
