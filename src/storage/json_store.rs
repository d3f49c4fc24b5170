use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::warn;

use crate::storage::{HistoryStore, push_bounded};
use crate::workflows::WorkflowKind;

/// File-backed history. The whole log lives in `<base_dir>/<key>.json` and is
/// replaced atomically on every append, so readers never see a partial write.
pub struct JsonHistoryStore<E> {
    path: PathBuf,
    capacity: usize,
    lock: RwLock<()>,
    _entry: PhantomData<fn() -> E>,
}

impl<E> JsonHistoryStore<E> {
    pub fn new(base_dir: impl AsRef<Path>, key: &str, capacity: usize) -> Self {
        Self {
            path: base_dir.as_ref().join(format!("{}.json", key)),
            capacity,
            lock: RwLock::new(()),
            _entry: PhantomData,
        }
    }

    /// Store for variant `W` under its own key and capacity.
    pub fn for_kind<W>(base_dir: impl AsRef<Path>) -> Self
    where
        W: WorkflowKind<Results = E>,
    {
        Self::new(base_dir, W::HISTORY_KEY, W::HISTORY_CAPACITY)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<E: Serialize + DeserializeOwned> JsonHistoryStore<E> {
    /// Read the log, capped at capacity. Missing or unreadable data counts as
    /// an empty log.
    async fn read_log(&self) -> Vec<E> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read history, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<E>>(&data) {
            Ok(mut log) => {
                log.truncate(self.capacity);
                log
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt history, treating as empty");
                Vec::new()
            }
        }
    }

    async fn write_log(&self, log: &[E]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create history directory: {}", dir.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(log)?;
        tokio::fs::write(&tmp_path, &data)
            .await
            .with_context(|| format!("Failed to write history file: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace history file: {}", self.path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl<E> HistoryStore<E> for JsonHistoryStore<E>
where
    E: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn append(&self, entry: &E) -> Result<()> {
        let _lock = self.lock.write().await;
        let mut log = self.read_log().await;
        push_bounded(&mut log, entry.clone(), self.capacity);
        self.write_log(&log).await
    }

    async fn list(&self) -> Result<Vec<E>> {
        let _lock = self.lock.read().await;
        Ok(self.read_log().await)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
