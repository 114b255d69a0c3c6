//! Thread-scoped conversation memory.
//!
//! - [`thread_store`] -- [`ThreadMemoryStore`], the per-thread message logs
//!   with compaction and optional persistence.

pub mod thread_store;

pub use thread_store::{MemoryConfig, ThreadMemoryStore};
