pub mod json_store;
pub mod memory_store;

use anyhow::Result;
use async_trait::async_trait;

/// Bounded, most-recent-first log of completed runs.
///
/// Entries are only ever prepended or evicted wholesale; the log never holds
/// more than [`capacity`](HistoryStore::capacity) entries.
#[async_trait]
pub trait HistoryStore<E: Send + Sync + 'static>: Send + Sync {
    /// Insert `entry` at the head, evicting the oldest entries past capacity.
    async fn append(&self, entry: &E) -> Result<()>;

    /// All retained entries, newest first.
    async fn list(&self) -> Result<Vec<E>>;

    /// Maximum number of retained entries.
    fn capacity(&self) -> usize;
}

/// Prepend `entry` and drop whatever no longer fits.
pub(crate) fn push_bounded<E>(log: &mut Vec<E>, entry: E, capacity: usize) {
    log.insert(0, entry);
    log.truncate(capacity);
}
