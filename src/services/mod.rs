pub mod http;
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::types::{ProgressEvent, RunHandle, StatusReport};
use crate::workflows::WorkflowKind;

/// Failure talking to a status source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Network-level or server-side hiccup; worth retrying.
    #[error("{0}")]
    Transient(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The backend refused the request (bad input, unknown run).
    #[error("{0}")]
    Rejected(String),
    /// Anything else that retrying will not fix.
    #[error("{0}")]
    Failed(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_) | SourceError::Timeout(_))
    }
}

/// Channel a status source pushes pipeline progress into while a status
/// check is outstanding.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, stage: impl Into<String>) {
        if let Some(tx) = &self.tx {
            // The receiver is gone once the run was reset; nothing to report to.
            let _ = tx.send(ProgressEvent::new(stage));
        }
    }
}

/// Backend collaborator that admits runs and reports their status.
#[async_trait]
pub trait StatusSource<W: WorkflowKind>: Send + Sync {
    /// Submit a run and return its handle.
    async fn submit(&self, input: &W::Input) -> Result<RunHandle, SourceError>;

    /// Check the status of a run once. Progress reached while the check is
    /// outstanding is pushed into `progress`, in pipeline order.
    async fn fetch_status(
        &self,
        handle: &RunHandle,
        progress: &ProgressSink,
    ) -> Result<StatusReport<W::Results>, SourceError>;
}
