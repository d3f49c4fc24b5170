use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::storage::{HistoryStore, push_bounded};

/// In-memory history. Holds entries only for the lifetime of the store instance.
pub struct MemoryHistoryStore<E> {
    entries: Mutex<Vec<E>>,
    capacity: usize,
}

impl<E> MemoryHistoryStore<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }
}

#[async_trait]
impl<E> HistoryStore<E> for MemoryHistoryStore<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn append(&self, entry: &E) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;
        push_bounded(&mut entries, entry.clone(), self.capacity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<E>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;
        Ok(entries.clone())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
