//! The persisted shape of a thread log and the backend trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Longest thread id accepted by the persistence backends.
const MAX_THREAD_ID_LEN: usize = 128;

/// One persisted message: a `(role, content)` pair.
///
/// Serializes as a two-element JSON array, e.g. `["user", "hello"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedMessage(pub String, pub String);

impl RecordedMessage {
    /// Create a recorded message from a role name and its content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self(role.into(), content.into())
    }

    /// The role name (`system`, `user`, `assistant`, `tool`).
    pub fn role(&self) -> &str {
        &self.0
    }

    /// The message text.
    pub fn content(&self) -> &str {
        &self.1
    }
}

/// A keyed persistent store of thread logs.
///
/// Implementations must make [`ThreadLogStore::save`] atomic: either the
/// whole new log becomes visible or the previous one stays in place.
#[async_trait]
pub trait ThreadLogStore: Send + Sync {
    /// Replace the persisted log of `thread_id` with `messages`.
    async fn save(&self, thread_id: &str, messages: &[RecordedMessage]) -> StoreResult<()>;

    /// Read the persisted log of `thread_id`.
    ///
    /// Returns [`StoreError::NotFound`] when nothing was ever saved for it.
    async fn load(&self, thread_id: &str) -> StoreResult<Vec<RecordedMessage>>;

    /// Delete the persisted log of `thread_id`. Returns `true` if it existed.
    async fn delete(&self, thread_id: &str) -> StoreResult<bool>;

    /// List persisted thread ids in ascending order.
    async fn list(&self) -> StoreResult<Vec<String>>;
}

/// Check that `thread_id` is usable as a storage key.
///
/// Ids become file names in [`crate::JsonFileStore`], so path separators and
/// leading dots are refused.
pub fn validate_thread_id(thread_id: &str) -> StoreResult<()> {
    if thread_id.is_empty() {
        return Err(StoreError::InvalidArgument("thread id must not be empty".into()));
    }
    if thread_id.len() > MAX_THREAD_ID_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "thread id exceeds {MAX_THREAD_ID_LEN} characters"
        )));
    }
    if thread_id.starts_with('.') {
        return Err(StoreError::InvalidArgument(format!(
            "thread id `{thread_id}` must not start with `.`"
        )));
    }
    if let Some(bad) = thread_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(StoreError::InvalidArgument(format!(
            "thread id `{thread_id}` contains invalid character {bad:?}"
        )));
    }
    Ok(())
}
