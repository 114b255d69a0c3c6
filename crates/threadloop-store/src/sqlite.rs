//! SQLite-backed thread logs.
//!
//! Each thread has a row in `threads` and its messages in
//! `thread_messages`, ordered by `seq`. A save replaces every row of the
//! thread inside one transaction.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::thread_log::{RecordedMessage, ThreadLogStore, validate_thread_id};

/// [`ThreadLogStore`] over a migrated [`Database`].
#[derive(Clone)]
pub struct SqliteThreadStore {
    db: Database,
}

impl SqliteThreadStore {
    /// Create a store backed by `db`. Migrations must already have run.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ThreadLogStore for SqliteThreadStore {
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    async fn save(&self, thread_id: &str, messages: &[RecordedMessage]) -> StoreResult<()> {
        validate_thread_id(thread_id)?;
        let id = thread_id.to_string();
        let messages = messages.to_vec();

        self.db
            .write(move |tx| {
                tx.execute(
                    "INSERT INTO threads (id, updated_at) VALUES (?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                    rusqlite::params![id, Utc::now().timestamp()],
                )?;
                tx.execute(
                    "DELETE FROM thread_messages WHERE thread_id = ?1",
                    rusqlite::params![id],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO thread_messages (thread_id, seq, role, content) \
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for (seq, msg) in messages.iter().enumerate() {
                        stmt.execute(rusqlite::params![id, seq as i64, msg.role(), msg.content()])?;
                    }
                }
                Ok(())
            })
            .await?;

        debug!(thread_id, "thread log saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, thread_id: &str) -> StoreResult<Vec<RecordedMessage>> {
        validate_thread_id(thread_id)?;
        let id = thread_id.to_string();

        self.db
            .read(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM threads WHERE id = ?1)",
                    rusqlite::params![id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(StoreError::NotFound { entity: "thread", id });
                }

                let mut stmt = conn.prepare(
                    "SELECT role, content FROM thread_messages WHERE thread_id = ?1 ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![id], |row| {
                        Ok(RecordedMessage(row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, thread_id: &str) -> StoreResult<bool> {
        validate_thread_id(thread_id)?;
        let id = thread_id.to_string();

        self.db
            .write(move |tx| {
                tx.execute(
                    "DELETE FROM thread_messages WHERE thread_id = ?1",
                    rusqlite::params![id],
                )?;
                let deleted = tx.execute("DELETE FROM threads WHERE id = ?1", rusqlite::params![id])?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.db
            .read(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM threads ORDER BY id ASC")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await
    }
}
