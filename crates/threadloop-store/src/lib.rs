//! # threadloop-store
//!
//! Keyed persistence for conversation thread logs.
//!
//! A thread log is an ordered array of `(role, content)` pairs stored under
//! its thread id. Two backends implement [`ThreadLogStore`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ThreadLogStore (async trait)                │
//! ├──────────────────────┬───────────────────────┤
//! │  JsonFileStore       │  SqliteThreadStore    │
//! │  <dir>/<id>.json     │  thread_messages      │
//! │  temp file + rename  │  one transaction/save │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! Saves are all-or-nothing in both backends: a reader never observes a
//! partially written log.
//!
//! ## Quick start
//!
//! ```ignore
//! use threadloop_store::{JsonFileStore, RecordedMessage, ThreadLogStore};
//!
//! let store = JsonFileStore::open("data/memory")?;
//! store.save("t1", &[RecordedMessage::new("user", "hello")]).await?;
//! let log = store.load("t1").await?;
//! ```

pub mod db;
pub mod error;
pub mod json_file;
pub mod migration;
pub mod sqlite;
pub mod thread_log;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use json_file::JsonFileStore;
pub use sqlite::SqliteThreadStore;
pub use thread_log::{RecordedMessage, ThreadLogStore, validate_thread_id};
