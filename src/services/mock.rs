use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::engine::types::{RunHandle, StatusReport};
use crate::services::{ProgressSink, SourceError, StatusSource};
use crate::workflows::{Campaign, Research, WorkflowKind, campaign, research};

/// Variants that can fabricate terminal results for a mock backend.
pub trait CannedResults: WorkflowKind {
    /// Artificial time a status check takes before resolving.
    const STATUS_DELAY: Duration;

    fn canned(
        handle: &RunHandle,
        input: &Self::Input,
        submitted_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> Self::Results;
}

impl CannedResults for Research {
    const STATUS_DELAY: Duration = Duration::from_millis(2000);

    fn canned(
        handle: &RunHandle,
        input: &research::ResearchInput,
        _submitted_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> research::ResearchResults {
        research::sample_results(handle, input, elapsed_ms)
    }
}

impl CannedResults for Campaign {
    const STATUS_DELAY: Duration = Duration::from_millis(3000);

    fn canned(
        handle: &RunHandle,
        brief: &campaign::CampaignBrief,
        submitted_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> campaign::CampaignResults {
        campaign::sample_results(handle, brief, submitted_at, elapsed_ms)
    }
}

/// Generate a handle of the form `<prefix>_<unix-millis>_<9 random chars>`.
pub fn mint_handle<W: WorkflowKind>() -> RunHandle {
    let suffix = Uuid::new_v4().simple().to_string();
    RunHandle::new(format!(
        "{}_{}_{}",
        W::HANDLE_PREFIX,
        Utc::now().timestamp_millis(),
        &suffix[..9]
    ))
}

/// Artificial latencies of the mock backend.
#[derive(Debug, Clone)]
pub struct MockDelays {
    pub submit: Duration,
    pub status: Duration,
    pub stage: Duration,
}

impl MockDelays {
    pub fn for_kind<W: CannedResults>() -> Self {
        Self {
            submit: Duration::from_millis(500),
            status: W::STATUS_DELAY,
            stage: Duration::from_millis(750),
        }
    }

    pub fn instant() -> Self {
        Self {
            submit: Duration::ZERO,
            status: Duration::ZERO,
            stage: Duration::ZERO,
        }
    }
}

/// Most runs a mock backend keeps track of at once.
pub const MAX_TRACKED_RUNS: usize = 256;

/// Per-run records keyed by handle, bounded by evicting the run admitted
/// first.
pub struct RunTable<V> {
    runs: HashMap<RunHandle, V>,
    order: VecDeque<RunHandle>,
    capacity: usize,
}

impl<V> RunTable<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Track `run` under `handle`, returning the handle evicted to make room.
    pub fn admit(&mut self, handle: RunHandle, run: V) -> Option<RunHandle> {
        let evicted = if self.runs.len() >= self.capacity {
            self.order.pop_front().inspect(|oldest| {
                self.runs.remove(oldest);
            })
        } else {
            None
        };
        self.order.push_back(handle.clone());
        self.runs.insert(handle, run);
        evicted
    }

    pub fn get(&self, handle: &RunHandle) -> Option<&V> {
        self.runs.get(handle)
    }

    pub fn get_mut(&mut self, handle: &RunHandle) -> Option<&mut V> {
        self.runs.get_mut(handle)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Scripted deviations from the happy path.
#[derive(Debug, Clone, Default)]
struct Script {
    submit_failure: Option<String>,
    report_error: bool,
    transient_failures: u32,
    running_polls: u32,
}

struct MockRun<I> {
    input: I,
    submitted_at: DateTime<Utc>,
    checks: u32,
    stages_reported: bool,
}

/// In-process status source returning canned results after fixed delays.
pub struct MockStatusSource<W: CannedResults> {
    delays: MockDelays,
    script: Script,
    runs: Mutex<RunTable<MockRun<W::Input>>>,
}

impl<W: CannedResults> Default for MockStatusSource<W> {
    fn default() -> Self {
        Self::new(MockDelays::for_kind::<W>())
    }
}

impl<W: CannedResults> MockStatusSource<W> {
    pub fn new(delays: MockDelays) -> Self {
        Self {
            delays,
            script: Script::default(),
            runs: Mutex::new(RunTable::new(MAX_TRACKED_RUNS)),
        }
    }

    /// Track at most `limit` runs; older runs become unknown.
    pub fn with_run_limit(mut self, limit: usize) -> Self {
        self.runs = Mutex::new(RunTable::new(limit));
        self
    }

    /// Reject every submission with `message`.
    pub fn failing_submit(mut self, message: impl Into<String>) -> Self {
        self.script.submit_failure = Some(message.into());
        self
    }

    /// Resolve every run with an `error` status.
    pub fn reporting_error(mut self) -> Self {
        self.script.report_error = true;
        self
    }

    /// Fail the first `n` status checks of each run with a retryable error.
    pub fn with_transient_failures(mut self, n: u32) -> Self {
        self.script.transient_failures = n;
        self
    }

    /// Answer `running` to the first `n` successful status checks of each run.
    pub fn with_running_polls(mut self, n: u32) -> Self {
        self.script.running_polls = n;
        self
    }

    /// Number of status checks made against `handle` so far.
    pub fn checks(&self, handle: &RunHandle) -> u32 {
        self.runs().get(handle).map(|r| r.checks).unwrap_or(0)
    }

    fn runs(&self) -> MutexGuard<'_, RunTable<MockRun<W::Input>>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: CannedResults> StatusSource<W> for MockStatusSource<W> {
    async fn submit(&self, input: &W::Input) -> Result<RunHandle, SourceError> {
        tokio::time::sleep(self.delays.submit).await;

        if let Some(ref message) = self.script.submit_failure {
            return Err(SourceError::Rejected(message.clone()));
        }

        let handle = mint_handle::<W>();
        let evicted = self.runs().admit(
            handle.clone(),
            MockRun {
                input: input.clone(),
                submitted_at: Utc::now(),
                checks: 0,
                stages_reported: false,
            },
        );
        if let Some(evicted) = evicted {
            debug!(run = %evicted, workflow = W::NAME, "Mock run evicted");
        }
        debug!(run = %handle, workflow = W::NAME, "Mock run admitted");
        Ok(handle)
    }

    async fn fetch_status(
        &self,
        handle: &RunHandle,
        progress: &ProgressSink,
    ) -> Result<StatusReport<W::Results>, SourceError> {
        let (check, report_stages) = {
            let mut runs = self.runs();
            let run = runs
                .get_mut(handle)
                .ok_or_else(|| SourceError::Rejected(format!("Unknown run: {}", handle)))?;
            run.checks += 1;
            let check = run.checks;
            let settled = check > self.script.transient_failures + self.script.running_polls;
            let report_stages = settled && !run.stages_reported;
            if report_stages {
                run.stages_reported = true;
            }
            (check, report_stages)
        };

        if check <= self.script.transient_failures {
            return Err(SourceError::Transient(
                "simulated network failure".to_string(),
            ));
        }
        if check <= self.script.transient_failures + self.script.running_polls {
            return Ok(StatusReport::running());
        }

        if report_stages {
            for stage in W::STAGES {
                tokio::time::sleep(self.delays.stage).await;
                progress.emit(stage.name);
            }
        }
        tokio::time::sleep(self.delays.status).await;

        if self.script.report_error {
            return Ok(StatusReport::failed());
        }

        let runs = self.runs();
        let run = runs
            .get(handle)
            .ok_or_else(|| SourceError::Rejected(format!("Unknown run: {}", handle)))?;
        let elapsed_ms = (Utc::now() - run.submitted_at).num_milliseconds().max(0) as u64;
        Ok(StatusReport::done(W::canned(
            handle,
            &run.input,
            run.submitted_at,
            elapsed_ms,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{Depth, Scope};

    fn input() -> research::ResearchInput {
        research::ResearchInput::new("What is the market size for X?", Scope::MarketAnalysis, Depth::Standard)
    }

    #[test]
    fn handles_carry_prefix_and_are_unique() {
        let a = mint_handle::<Campaign>();
        let b = mint_handle::<Campaign>();
        assert!(a.as_str().starts_with("campaign_"));
        assert_ne!(a, b);
        assert_eq!(a.as_str().rsplit('_').next().unwrap().len(), 9);
    }

    #[test]
    fn run_table_evicts_first_admitted() {
        let mut table = RunTable::new(2);
        assert_eq!(table.admit(RunHandle::new("a"), 1), None);
        assert_eq!(table.admit(RunHandle::new("b"), 2), None);
        assert_eq!(table.admit(RunHandle::new("c"), 3), Some(RunHandle::new("a")));

        assert_eq!(table.len(), 2);
        assert!(table.get(&RunHandle::new("a")).is_none());
        assert_eq!(table.get(&RunHandle::new("c")), Some(&3));
    }

    #[tokio::test]
    async fn run_limit_forgets_oldest_runs() {
        let source = MockStatusSource::<Research>::new(MockDelays::instant()).with_run_limit(1);
        let first = source.submit(&input()).await.unwrap();
        let second = source.submit(&input()).await.unwrap();
        let sink = ProgressSink::discard();

        assert!(matches!(
            source.fetch_status(&first, &sink).await.unwrap_err(),
            SourceError::Rejected(_)
        ));
        assert!(source.fetch_status(&second, &sink).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_handle_is_rejected() {
        let source = MockStatusSource::<Research>::new(MockDelays::instant());
        let err = source
            .fetch_status(&RunHandle::new("run_missing"), &ProgressSink::discard())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn scripted_checks_progress_to_done() {
        let source = MockStatusSource::<Research>::new(MockDelays::instant())
            .with_transient_failures(1)
            .with_running_polls(1);
        let handle = source.submit(&input()).await.unwrap();
        let sink = ProgressSink::discard();

        assert!(source.fetch_status(&handle, &sink).await.unwrap_err().is_retryable());
        assert_eq!(
            source.fetch_status(&handle, &sink).await.unwrap().status,
            crate::engine::types::RunStatus::Running
        );
        let report = source.fetch_status(&handle, &sink).await.unwrap();
        assert_eq!(report.results.unwrap().query, "What is the market size for X?");
        assert_eq!(source.checks(&handle), 3);
    }
}
