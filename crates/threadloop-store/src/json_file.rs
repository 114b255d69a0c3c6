//! One JSON file per thread.
//!
//! Each thread log lives at `<dir>/<thread_id>.json` as a pretty-printed
//! array of `[role, content]` pairs. Writes go to a temporary file in the
//! same directory which is then renamed over the target, so a crash mid-save
//! leaves the previous file intact.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{StoreError, StoreResult};
use crate::thread_log::{RecordedMessage, ThreadLogStore, validate_thread_id};

/// File extension used for persisted thread logs.
const EXTENSION: &str = "json";

/// File-backed [`ThreadLogStore`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// This call blocks briefly on directory creation; call it during startup.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "json thread store opened");
        Ok(Self { dir })
    }

    /// The directory holding the thread files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{thread_id}.{EXTENSION}"))
    }
}

#[async_trait]
impl ThreadLogStore for JsonFileStore {
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    async fn save(&self, thread_id: &str, messages: &[RecordedMessage]) -> StoreResult<()> {
        validate_thread_id(thread_id)?;
        let body = serde_json::to_vec_pretty(messages)?;
        let dir = self.dir.clone();
        let target = self.path_for(thread_id);

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target)?;
            Ok(())
        })
        .await??;

        debug!(thread_id, "thread log saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, thread_id: &str) -> StoreResult<Vec<RecordedMessage>> {
        validate_thread_id(thread_id)?;
        let path = self.path_for(thread_id);
        let id = thread_id.to_string();

        let raw = tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                entity: "thread",
                id,
            }),
            Err(e) => Err(StoreError::Io(e)),
        })
        .await??;

        let messages: Vec<RecordedMessage> = serde_json::from_slice(&raw)?;
        debug!(thread_id, count = messages.len(), "thread log loaded");
        Ok(messages)
    }

    #[instrument(skip(self))]
    async fn delete(&self, thread_id: &str) -> StoreResult<bool> {
        validate_thread_id(thread_id)?;
        let path = self.path_for(thread_id);

        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        })
        .await?
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<Vec<String>> {
            let mut ids = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                    && validate_thread_id(stem).is_ok()
                {
                    ids.push(stem.to_string());
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await?
    }
}
