//! Per-thread message logs.
//!
//! Each thread owns an ordered log guarded by its own async mutex, so work
//! on one thread never waits on another.  The log is append-only except for
//! compaction, which swaps the entire log for one summary message while the
//! lock is held.

use std::sync::Arc;

use dashmap::DashMap;
use threadloop_store::{RecordedMessage, StoreError, ThreadLogStore};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::compaction::{self, Summarizer};
use crate::error::{AgentError, Result};
use crate::llm::types::{Message, Role};

type ThreadLog = Arc<Mutex<Vec<Message>>>;

/// Memory policy.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Size (role plus content characters) above which a log is compacted.
    pub max_history_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: 4096,
        }
    }
}

/// Owns one message log per thread id.
pub struct ThreadMemoryStore {
    threads: DashMap<String, ThreadLog>,
    summarizer: Summarizer,
    persistence: Option<Arc<dyn ThreadLogStore>>,
    config: MemoryConfig,
}

impl ThreadMemoryStore {
    pub fn new(config: MemoryConfig, summarizer: Summarizer) -> Self {
        Self {
            threads: DashMap::new(),
            summarizer,
            persistence: None,
            config,
        }
    }

    /// Attach a backend used by [`save`](Self::save) and [`load`](Self::load).
    pub fn with_persistence(mut self, store: Arc<dyn ThreadLogStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    fn log(&self, thread_id: &str) -> ThreadLog {
        if let Some(log) = self.threads.get(thread_id) {
            return Arc::clone(&log);
        }
        Arc::clone(&self.threads.entry(thread_id.to_owned()).or_default())
    }

    fn persistence(&self) -> Result<&Arc<dyn ThreadLogStore>> {
        self.persistence
            .as_ref()
            .ok_or(AgentError::PersistenceUnavailable)
    }

    // -- Log access -----------------------------------------------------------

    /// Append a message, creating the thread lazily.
    pub async fn add_message(&self, thread_id: &str, role: Role, content: impl Into<String>) {
        self.push(thread_id, Message::new(role, content)).await;
    }

    /// Append a fully formed message.
    ///
    /// Persistence keeps only `(role, content)`, so this stays crate-private
    /// and is fed user messages and final answers only.
    pub(crate) async fn push(&self, thread_id: &str, message: Message) {
        let log = self.log(thread_id);
        log.lock().await.push(message);
    }

    /// The thread's history, compacting it first if it has grown too large.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::SummarizationFailed`] if compaction was needed
    /// and failed.  The log is left untouched in that case.
    #[instrument(skip(self), fields(max = self.config.max_history_size))]
    pub async fn get_history(&self, thread_id: &str) -> Result<Vec<Message>> {
        let log = self.log(thread_id);
        let mut messages = log.lock().await;

        if compaction::needs_compaction(&messages, self.config.max_history_size) {
            let original_len = messages.len();
            info!(
                messages = original_len,
                size = compaction::history_size(&messages),
                "compacting thread history"
            );

            let summary = match self.summarizer.summarize(&messages).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "compaction failed, history left unchanged");
                    return Err(e);
                }
            };

            *messages = vec![compaction::summary_message(original_len, &summary)];
            info!(original = original_len, "compaction complete");
        }

        Ok(messages.clone())
    }

    /// The resident log as-is, without evaluating compaction.
    pub async fn messages(&self, thread_id: &str) -> Vec<Message> {
        match self.threads.get(thread_id).map(|log| Arc::clone(&log)) {
            Some(log) => log.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Drop the thread's resident log.
    ///
    /// Does not wait for a running turn; use
    /// [`AgentOrchestrator::clear_thread`](crate::AgentOrchestrator::clear_thread)
    /// for that.
    pub fn clear(&self, thread_id: &str) {
        if self.threads.remove(thread_id).is_some() {
            debug!(thread_id, "cleared thread");
        }
    }

    /// Resident thread ids, sorted.
    pub fn list_threads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // -- Persistence ----------------------------------------------------------

    /// Write the thread's log to the persistence backend.
    ///
    /// The log stays locked while it is written, so the persisted copy is a
    /// consistent snapshot.
    #[instrument(skip(self))]
    pub async fn save(&self, thread_id: &str) -> Result<()> {
        let store = self.persistence()?;
        let log = self.log(thread_id);
        let messages = log.lock().await;

        let records: Vec<RecordedMessage> = messages
            .iter()
            .map(|m| RecordedMessage::new(m.role().as_str(), m.content()))
            .collect();
        store.save(thread_id, &records).await?;

        debug!(messages = records.len(), "saved thread");
        Ok(())
    }

    /// Replace the thread's resident log with the persisted one.
    ///
    /// Returns the number of messages loaded.
    #[instrument(skip(self))]
    pub async fn load(&self, thread_id: &str) -> Result<usize> {
        let store = self.persistence()?;
        let records = store.load(thread_id).await?;

        let loaded = records
            .iter()
            .map(|r| Ok(Message::new(r.role().parse()?, r.content())))
            .collect::<Result<Vec<Message>>>()?;
        let count = loaded.len();

        let log = self.log(thread_id);
        *log.lock().await = loaded;

        debug!(messages = count, "loaded thread");
        Ok(count)
    }

    /// Load the thread if the backend has it.  Returns `false` when it does not.
    pub async fn load_if_saved(&self, thread_id: &str) -> Result<bool> {
        match self.load(thread_id).await {
            Ok(_) => Ok(true),
            Err(AgentError::Store(StoreError::NotFound { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop the resident log and delete the persisted copy.
    ///
    /// Returns `true` if a persisted copy existed.
    pub async fn forget(&self, thread_id: &str) -> Result<bool> {
        self.clear(thread_id);
        match &self.persistence {
            Some(store) => Ok(store.delete(thread_id).await?),
            None => Ok(false),
        }
    }

    /// Thread ids known to the persistence backend.
    pub async fn list_saved(&self) -> Result<Vec<String>> {
        Ok(self.persistence()?.list().await?)
    }
}

impl std::fmt::Debug for ThreadMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadMemoryStore")
            .field("threads", &self.threads.len())
            .field("config", &self.config)
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}
