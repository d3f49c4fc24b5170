use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::error::{WorkflowError, describe};
use crate::engine::types::*;
use crate::services::{ProgressSink, SourceError, StatusSource};
use crate::storage::HistoryStore;
use crate::workflows::WorkflowKind;

/// Workflow state for variant `W`.
pub type StateOf<W> = WorkflowState<<W as WorkflowKind>::Input, <W as WorkflowKind>::Results>;

/// Client-side state machine driving one workflow variant:
/// `idle → running → done | error`, back to `idle` on reset.
///
/// Every submission takes a new generation number. Asynchronous results
/// carrying an older generation are dropped, so a reset or a newer run can
/// never be overwritten by a stale completion.
pub struct WorkflowMachine<W: WorkflowKind> {
    shared: Arc<Shared<W>>,
}

impl<W: WorkflowKind> Clone for WorkflowMachine<W> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<W: WorkflowKind> {
    source: Arc<dyn StatusSource<W>>,
    history: Arc<dyn HistoryStore<W::Results>>,
    config: PollConfig,
    state: watch::Sender<StateOf<W>>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    generation: u64,
    /// A submission or poll is outstanding for `generation`.
    in_flight: bool,
    poller: Option<JoinHandle<()>>,
}

/// What a single status check led to.
enum Step {
    /// Still in progress; check again later.
    Pending,
    /// Reached `done` or `error`.
    Settled,
    /// The run was reset or replaced meanwhile.
    Stale,
}

impl<W: WorkflowKind> WorkflowMachine<W> {
    pub fn new(
        source: Arc<dyn StatusSource<W>>,
        history: Arc<dyn HistoryStore<W::Results>>,
        config: PollConfig,
    ) -> Self {
        let (state, _) = watch::channel(StateOf::<W>::default());
        Self {
            shared: Arc::new(Shared {
                source,
                history,
                config,
                state,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> StateOf<W> {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<StateOf<W>> {
        self.shared.state.subscribe()
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore<W::Results>> {
        &self.shared.history
    }

    /// Submit `input` and start polling for its outcome.
    ///
    /// Rejected with [`WorkflowError::Busy`] while another submission or run
    /// is outstanding. A failed submission moves the machine to `error`.
    pub async fn submit(&self, input: W::Input) -> Result<RunHandle, WorkflowError> {
        let shared = &self.shared;
        let generation = {
            let mut ctl = shared.control.lock().await;
            if ctl.in_flight {
                warn!(workflow = W::NAME, "Submission rejected, a run is already in progress");
                return Err(WorkflowError::Busy);
            }
            ctl.generation += 1;
            ctl.in_flight = true;
            ctl.generation
        };

        info!(workflow = W::NAME, generation, "Submitting run");
        let timeout = shared.config.submit_timeout;
        let submitted = match tokio::time::timeout(timeout, shared.source.submit(&input)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };

        let mut ctl = shared.control.lock().await;
        if ctl.generation != generation {
            debug!(workflow = W::NAME, generation, "Submission superseded by reset");
            return Err(WorkflowError::Superseded);
        }

        match submitted {
            Ok(handle) => {
                info!(run = %handle, workflow = W::NAME, "Run started");
                shared.state.send_replace(WorkflowState {
                    phase: Phase::Running,
                    handle: Some(handle.clone()),
                    input: Some(input),
                    results: None,
                    error: None,
                    current_stage: None,
                });
                let poller = Shared::drive(Arc::downgrade(shared), generation, handle.clone());
                ctl.poller = Some(tokio::spawn(poller));
                Ok(handle)
            }
            Err(e) => {
                ctl.in_flight = false;
                let message = describe(&e, W::SUBMIT_FAILURE_MESSAGE);
                error!(workflow = W::NAME, error = %message, "Submission failed");
                shared.state.send_replace(WorkflowState {
                    phase: Phase::Error,
                    handle: None,
                    input: Some(input),
                    results: None,
                    error: Some(message),
                    current_stage: None,
                });
                Err(WorkflowError::Submit(e))
            }
        }
    }

    /// Check the current run's status right away instead of waiting for the
    /// next scheduled poll.
    ///
    /// A retryable failure is returned but leaves the run `running`; the
    /// scheduled poll keeps retrying it within the configured bounds. Any
    /// other failure is terminal for the run.
    pub async fn advance(&self) -> Result<Phase, WorkflowError> {
        let shared = &self.shared;
        let (generation, handle) = {
            let ctl = shared.control.lock().await;
            let state = shared.state.borrow();
            match (&state.phase, &state.handle) {
                (Phase::Running, Some(handle)) => (ctl.generation, handle.clone()),
                _ => return Err(WorkflowError::NotRunning),
            }
        };

        match shared.check(generation, &handle).await {
            Ok(Step::Stale) => Err(WorkflowError::Superseded),
            Ok(_) => Ok(shared.state.borrow().phase),
            Err(e) if e.is_retryable() => {
                warn!(run = %handle, error = %e, "Manual status check failed, run left to scheduled retry");
                Err(WorkflowError::Status(e))
            }
            Err(e) => {
                shared.fail(generation, describe(&e, "Unknown error")).await;
                Err(WorkflowError::Status(e))
            }
        }
    }

    /// Return to the initial idle state, cancelling any scheduled poll.
    /// Persisted history is untouched.
    pub async fn reset(&self) {
        let mut ctl = self.shared.control.lock().await;
        ctl.generation += 1;
        ctl.in_flight = false;
        if let Some(poller) = ctl.poller.take() {
            poller.abort();
        }
        self.shared.state.send_replace(StateOf::<W>::default());
        info!(workflow = W::NAME, "Workflow reset");
    }

    /// Wait until the machine is no longer `running` and return that state.
    pub async fn settled(&self) -> StateOf<W> {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| s.phase != Phase::Running).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

impl<W: WorkflowKind> Shared<W> {
    /// Poll until the run settles, the poll budget runs out, or the machine
    /// is dropped.
    async fn drive(weak: Weak<Self>, generation: u64, handle: RunHandle) {
        let mut polls = 0u32;
        let mut failures = 0u32;

        loop {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            polls += 1;

            let delay = match shared.check(generation, &handle).await {
                Ok(Step::Settled) | Ok(Step::Stale) => return,
                Ok(Step::Pending) => {
                    failures = 0;
                    shared.config.poll_interval
                }
                Err(e) if e.is_retryable() && failures < shared.config.retry.max_retries => {
                    failures += 1;
                    let delay = shared.config.retry.backoff(failures);
                    warn!(
                        run = %handle,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Status check failed — retrying after backoff"
                    );
                    delay
                }
                Err(e) => {
                    shared.fail(generation, describe(&e, "Unknown error")).await;
                    return;
                }
            };

            if polls >= shared.config.max_polls {
                let message = format!(
                    "Run {} did not finish after {} status checks",
                    handle, polls
                );
                shared.fail(generation, message).await;
                return;
            }

            drop(shared);
            tokio::time::sleep(delay).await;
        }
    }

    /// One status check, forwarding progress events as they arrive.
    async fn check(&self, generation: u64, handle: &RunHandle) -> Result<Step, SourceError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProgressSink::new(tx);
        let timeout = self.config.status_timeout;

        let fetch = tokio::time::timeout(timeout, self.source.fetch_status(handle, &sink));
        tokio::pin!(fetch);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.progress(generation, event).await,
                outcome = &mut fetch => break outcome,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.progress(generation, event).await;
        }

        let report = match outcome {
            Ok(result) => result?,
            Err(_) => return Err(SourceError::Timeout(timeout)),
        };

        match report.status {
            RunStatus::Pending | RunStatus::Running => {
                debug!(run = %handle, status = %report.status, "Run still in progress");
                Ok(Step::Pending)
            }
            RunStatus::Error => Ok(if self.fail(generation, W::FAILURE_MESSAGE.to_string()).await {
                Step::Settled
            } else {
                Step::Stale
            }),
            RunStatus::Done => {
                let Some(mut results) = report.results else {
                    return Err(SourceError::Failed(
                        "Run finished without results".to_string(),
                    ));
                };
                W::normalize(&mut results).map_err(SourceError::Failed)?;
                Ok(if self.complete(generation, results).await {
                    Step::Settled
                } else {
                    Step::Stale
                })
            }
        }
    }

    fn is_current(&self, ctl: &Control, generation: u64) -> bool {
        ctl.generation == generation && self.state.borrow().phase == Phase::Running
    }

    async fn progress(&self, generation: u64, event: ProgressEvent) {
        let ctl = self.control.lock().await;
        if !self.is_current(&ctl, generation) {
            return;
        }
        info!(workflow = W::NAME, stage = %event.stage, "Progress");
        self.state.send_modify(|s| s.current_stage = Some(event.stage));
    }

    /// Record results, append them to history, then publish `done`.
    async fn complete(&self, generation: u64, results: W::Results) -> bool {
        let mut ctl = self.control.lock().await;
        if !self.is_current(&ctl, generation) {
            debug!(workflow = W::NAME, generation, "Discarding stale completion");
            return false;
        }
        ctl.in_flight = false;

        if let Err(e) = self.history.append(&results).await {
            warn!(workflow = W::NAME, error = %format!("{:#}", e), "Failed to save run to history");
        }

        self.state.send_modify(|s| {
            s.phase = Phase::Done;
            s.results = Some(results);
            s.error = None;
            s.current_stage = None;
        });
        info!(workflow = W::NAME, "Run completed");
        true
    }

    async fn fail(&self, generation: u64, message: String) -> bool {
        let mut ctl = self.control.lock().await;
        if !self.is_current(&ctl, generation) {
            debug!(workflow = W::NAME, generation, "Discarding stale failure");
            return false;
        }
        ctl.in_flight = false;

        error!(workflow = W::NAME, error = %message, "Run failed");
        self.state.send_modify(|s| {
            s.phase = Phase::Error;
            s.results = None;
            s.error = Some(message);
            s.current_stage = None;
        });
        true
    }
}

impl<W: WorkflowKind> Drop for Shared<W> {
    fn drop(&mut self) {
        if let Some(poller) = self.control.get_mut().poller.take() {
            poller.abort();
        }
    }
}

