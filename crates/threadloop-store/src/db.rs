//! The SQLite file behind [`SqliteThreadStore`](crate::SqliteThreadStore).
//!
//! One connection serves every thread log.  Work is shipped to the blocking
//! pool: [`Database::read`] for queries, [`Database::write`] for changes,
//! which always run inside a transaction so a thread's rows are replaced
//! or removed as a unit.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Shared handle to the thread-log database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// Blocks on file I/O; [`open_and_migrate`](Self::open_and_migrate) is
    /// the async entry point.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening thread database");
        Self::from_connection(Connection::open(path)?)
    }

    /// A private in-memory database, used by tests and throwaway sessions.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory thread database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open the file off the async runtime and bring its schema up to date.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.read(|conn| migration::run_all(conn)).await
    }

    /// Run a query against the connection.
    pub async fn read<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await?
    }

    /// Run `f` in a transaction, committing only if it returns `Ok`.
    ///
    /// An error drops the transaction, which rolls it back.
    pub async fn write<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await?
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        // WAL lets `threads list` read while a chat session is saving.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Messages cascade with their thread row.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::TaskJoin(format!("connection mutex poisoned: {e}")))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn thread_rows(db: &Database) -> i64 {
        db.read(|conn| Ok(conn.query_row("SELECT count(*) FROM threads", [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_create_empty_thread_tables() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();

        let messages: i64 = db
            .read(|conn| {
                Ok(conn.query_row("SELECT count(*) FROM thread_messages", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(messages, 0);
        assert_eq!(thread_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_rows() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();

        let result: StoreResult<()> = db
            .write(|tx| {
                tx.execute(
                    "INSERT INTO threads (id, updated_at) VALUES ('t', 0)",
                    [],
                )?;
                Err(StoreError::NotFound {
                    entity: "thread",
                    id: "t".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(thread_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn committed_write_is_visible() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();

        db.write(|tx| {
            tx.execute("INSERT INTO threads (id, updated_at) VALUES ('t', 0)", [])?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(thread_rows(&db).await, 1);
    }
}
