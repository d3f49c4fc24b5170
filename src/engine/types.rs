use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side lifecycle phase of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Running => write!(f, "running"),
            Phase::Done => write!(f, "done"),
            Phase::Error => write!(f, "error"),
        }
    }
}

/// Status of a run as reported by a status source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Done => write!(f, "done"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Opaque identifier assigned to a run at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(String);

impl RunHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// One answer from a status check.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport<R> {
    pub status: RunStatus,
    pub results: Option<R>,
}

impl<R> StatusReport<R> {
    pub fn running() -> Self {
        Self {
            status: RunStatus::Running,
            results: None,
        }
    }

    pub fn done(results: R) -> Self {
        Self {
            status: RunStatus::Done,
            results: Some(results),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: RunStatus::Error,
            results: None,
        }
    }
}

/// A named pipeline stage reached by the backend. Display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: String,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
        }
    }
}

/// Snapshot of a workflow exposed to renderers.
///
/// `results` is `Some` exactly when `phase` is [`Phase::Done`], and `error`
/// is `Some` exactly when `phase` is [`Phase::Error`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState<I, R> {
    pub phase: Phase,
    pub handle: Option<RunHandle>,
    pub input: Option<I>,
    pub results: Option<R>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
}

impl<I, R> Default for WorkflowState<I, R> {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            handle: None,
            input: None,
            results: None,
            error: None,
            current_stage: None,
        }
    }
}

impl<I, R> WorkflowState<I, R> {
    pub fn is_initial(&self) -> bool {
        self.phase == Phase::Idle
            && self.handle.is_none()
            && self.input.is_none()
            && self.results.is_none()
            && self.error.is_none()
            && self.current_stage.is_none()
    }
}

/// Retry configuration for transient status-check failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of consecutive retries before giving up.
    pub max_retries: u32,
    /// Initial backoff duration in seconds (doubles each attempt).
    pub backoff_s: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_s: 0.5,
        }
    }
}

impl RetryConfig {
    /// Backoff to wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.backoff_s * 2.0_f64.powi(attempt.saturating_sub(1) as i32);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Timing and bounds for submission and status polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status checks while the run is still in progress.
    pub poll_interval: Duration,
    /// Upper bound on status checks for a single run.
    pub max_polls: u32,
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
            submit_timeout: Duration::from_secs(10),
            status_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}
