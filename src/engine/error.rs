use crate::services::SourceError;

/// Errors returned by [`WorkflowMachine`](super::WorkflowMachine) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("a run is already in progress")]
    Busy,
    /// The run was reset or replaced before the operation finished.
    #[error("the run was superseded before it completed")]
    Superseded,
    #[error("no run is in progress")]
    NotRunning,
    #[error("submission failed: {0}")]
    Submit(#[source] SourceError),
    #[error("status check failed: {0}")]
    Status(#[source] SourceError),
}

/// Human-readable message for a failure, falling back when it has none.
pub(crate) fn describe(err: &SourceError, fallback: &str) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
