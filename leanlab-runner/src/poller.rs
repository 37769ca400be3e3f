//! Remote job poller: drives a job's phase state machine to a terminal state.
//!
//! One thread per job issues status queries strictly one after another, so
//! two polls for the same job are never in flight together. Waits are sliced
//! so cancellation and "poll now" requests are noticed promptly.
//!
//! Every observer callback runs inside the cancellation gate's lock, and
//! `cancel()` takes that same lock: once `cancel()` returns, no callback can
//! fire, even if a request that was in flight resolves afterwards. Observers
//! must therefore never call back into the `PollerHandle` they belong to.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use leanlab_core::error::{JobError, PollingError};
use leanlab_core::job::{JobHandle, SharedHandle};
use leanlab_core::service::JobService;
use leanlab_core::status::{
    backtest_overall_progress, BacktestOutcome, BacktestProgress, CompileOutcome,
    CompileProgress, JobStatus, Phase,
};
use leanlab_core::Clock;

/// Granularity of interruptible waits.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Poll intervals and the global deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Interval while compilation is pending (and while the backtest id is awaited).
    pub compile_interval: Duration,
    /// Interval while the backtest runs.
    pub backtest_interval: Duration,
    /// Measured from submission, not from the first poll.
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            compile_interval: Duration::from_millis(2000),
            backtest_interval: Duration::from_millis(5000),
            timeout: Duration::from_millis(600_000),
        }
    }
}

/// Receives status updates from the poll thread.
pub trait JobObserver: Send {
    /// Called whenever the status changes, terminal states included.
    fn on_phase_change(&mut self, status: &JobStatus);

    /// Called exactly once, right after the `Completed` phase change.
    fn on_complete(&mut self, status: &JobStatus);
}

/// Result of feeding one poll response into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Unchanged,
    Changed,
    Completed,
    Failed,
}

/// Pure phase state machine. Knows nothing about threads or time.
#[derive(Debug, Clone)]
pub struct JobTracker {
    status: JobStatus,
}

impl JobTracker {
    /// Start in the waiting phase the handle's ids allow, if any.
    pub fn for_handle(handle: &JobHandle) -> Option<Self> {
        let phase = if handle.backtest_id.is_some() {
            Phase::BacktestWaiting
        } else if handle.compile_id.is_some() {
            Phase::CompilationWaiting
        } else {
            return None;
        };
        Some(Self {
            status: JobStatus::entering(phase),
        })
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }

    pub fn on_compile(&mut self, progress: &CompileProgress) -> Step {
        if self.phase() != Phase::CompilationWaiting {
            return Step::Unchanged;
        }
        match progress.outcome() {
            CompileOutcome::Succeeded => self.update(
                Phase::RunningBacktest,
                &progress.raw_state,
                Phase::RunningBacktest.baseline_progress(),
            ),
            CompileOutcome::Failed => {
                self.status.raw_state = progress.raw_state.clone();
                self.fail(&JobError::RemoteFailure("Compilation failed".into()))
            }
            CompileOutcome::Pending => self.update(
                Phase::CompilationWaiting,
                &progress.raw_state,
                Phase::CompilationWaiting.baseline_progress(),
            ),
        }
    }

    /// While `RunningBacktest`, move on once the backtest id is known.
    pub fn on_backtest_id(&mut self, available: bool) -> Step {
        if self.phase() != Phase::RunningBacktest || !available {
            return Step::Unchanged;
        }
        let raw = self.status.raw_state.clone();
        self.update(
            Phase::BacktestWaiting,
            &raw,
            Phase::BacktestWaiting.baseline_progress(),
        )
    }

    pub fn on_backtest(&mut self, progress: &BacktestProgress) -> Step {
        if self.phase() != Phase::BacktestWaiting {
            return Step::Unchanged;
        }
        match progress.outcome() {
            BacktestOutcome::Completed => {
                self.status = self.status.advance(Phase::Completed, &progress.raw_status, 100.0);
                Step::Completed
            }
            BacktestOutcome::Failed => {
                self.status.raw_state = progress.raw_status.clone();
                self.fail(&JobError::RemoteFailure("Backtest failed".into()))
            }
            BacktestOutcome::Running { progress: pct } => self.update(
                Phase::BacktestWaiting,
                &progress.raw_status,
                backtest_overall_progress(pct),
            ),
        }
    }

    pub fn fail(&mut self, err: &JobError) -> Step {
        if self.status.is_terminal() {
            return Step::Unchanged;
        }
        self.status = self.status.fail(err.to_string());
        Step::Failed
    }

    fn update(&mut self, phase: Phase, raw_state: &str, progress: f64) -> Step {
        let next = self.status.advance(phase, raw_state, progress);
        if next == self.status {
            Step::Unchanged
        } else {
            self.status = next;
            Step::Changed
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    cancelled: bool,
    poll_now: bool,
}

/// Cancellation gate shared by the poll thread and its handle.
#[derive(Debug, Default)]
struct Gate {
    state: Mutex<GateState>,
}

impl Gate {
    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        self.lock().cancelled = true;
    }

    fn request_poll(&self) {
        self.lock().poll_now = true;
    }

    fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Run `f` unless cancelled. Returns false if cancelled.
    fn emit(&self, f: impl FnOnce()) -> bool {
        let state = self.lock();
        if state.cancelled {
            return false;
        }
        f();
        drop(state);
        true
    }

    /// Sleep up to `duration` on `clock`. Returns early on a poll-now request;
    /// returns false if cancelled.
    fn wait(&self, clock: &dyn Clock, duration: Duration) -> bool {
        let mut remaining = duration;
        loop {
            {
                let mut state = self.lock();
                if state.cancelled {
                    return false;
                }
                if state.poll_now {
                    state.poll_now = false;
                    return true;
                }
            }
            if remaining.is_zero() {
                return true;
            }
            let step = remaining.min(WAIT_SLICE);
            clock.sleep(step);
            remaining -= step;
        }
    }
}

/// Handle to a running poll thread.
pub struct PollerHandle {
    gate: Arc<Gate>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling. No callback fires after this returns.
    pub fn cancel(&self) {
        self.gate.cancel();
    }

    /// Skip the rest of the current wait and poll immediately.
    pub fn poll_now(&self) {
        self.gate.request_poll();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Wait for the poll thread to exit.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.gate.cancel();
    }
}

/// Starts poll threads against one service and clock.
#[derive(Clone)]
pub struct Poller {
    service: Arc<dyn JobService>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(service: Arc<dyn JobService>, clock: Arc<dyn Clock>, config: PollerConfig) -> Self {
        Self {
            service,
            clock,
            config,
        }
    }

    /// Begin polling `handle`. `submitted_at` is the clock reading at
    /// submission; the global timeout counts from there.
    pub fn start(
        &self,
        handle: SharedHandle,
        submitted_at: Duration,
        observer: Box<dyn JobObserver>,
    ) -> std::io::Result<PollerHandle> {
        let gate = Arc::new(Gate::default());
        let ctx = PollContext {
            service: Arc::clone(&self.service),
            clock: Arc::clone(&self.clock),
            config: self.config,
            gate: Arc::clone(&gate),
            handle,
            submitted_at,
            observer,
        };

        let thread = thread::Builder::new()
            .name("leanlab-poller".into())
            .spawn(move || ctx.run())?;

        Ok(PollerHandle {
            gate,
            thread: Some(thread),
        })
    }
}

struct PollContext {
    service: Arc<dyn JobService>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    gate: Arc<Gate>,
    handle: SharedHandle,
    submitted_at: Duration,
    observer: Box<dyn JobObserver>,
}

impl PollContext {
    fn snapshot(&self) -> JobHandle {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn run(mut self) {
        let initial = self.snapshot();
        let Some(mut tracker) = JobTracker::for_handle(&initial) else {
            let status = JobStatus::idle().fail(
                JobError::Polling(PollingError::MissingId("compile/backtest")).to_string(),
            );
            let observer = &mut self.observer;
            self.gate.emit(|| observer.on_phase_change(&status));
            return;
        };

        info!(handle = %initial, phase = ?tracker.phase(), "polling started");
        if !self.publish(&tracker, Step::Changed) {
            return;
        }

        loop {
            let elapsed = self.clock.now().saturating_sub(self.submitted_at);
            if elapsed >= self.config.timeout {
                warn!(?elapsed, "job timed out");
                let step = tracker.fail(&JobError::Timeout { elapsed });
                self.publish(&tracker, step);
                return;
            }

            let interval = match tracker.phase() {
                Phase::CompilationWaiting | Phase::RunningBacktest => self.config.compile_interval,
                Phase::BacktestWaiting => self.config.backtest_interval,
                _ => return,
            };
            let wait = interval.min(self.config.timeout - elapsed);
            if !self.gate.wait(self.clock.as_ref(), wait) {
                debug!("polling cancelled");
                return;
            }
            if self.clock.now().saturating_sub(self.submitted_at) >= self.config.timeout {
                continue;
            }

            let handle = self.snapshot();
            let step = match tracker.phase() {
                Phase::CompilationWaiting => self
                    .service
                    .compile_status(&handle)
                    .map(|p| tracker.on_compile(&p)),
                Phase::RunningBacktest => Ok(tracker.on_backtest_id(handle.backtest_id.is_some())),
                Phase::BacktestWaiting => self
                    .service
                    .backtest_status(&handle)
                    .map(|p| tracker.on_backtest(&p)),
                _ => return,
            };
            let step = step.unwrap_or_else(|e| {
                warn!(error = %e, "status query failed");
                tracker.fail(&JobError::Polling(e))
            });

            debug!(phase = ?tracker.phase(), progress = tracker.status().progress, "poll tick");
            if !self.publish(&tracker, step) {
                return;
            }
        }
    }

    /// Deliver `step` to the observer. Returns false when polling must stop.
    fn publish(&mut self, tracker: &JobTracker, step: Step) -> bool {
        let status = tracker.status();
        let observer = &mut self.observer;
        match step {
            Step::Unchanged => !self.gate.is_cancelled(),
            Step::Changed => self.gate.emit(|| observer.on_phase_change(status)),
            Step::Completed => {
                info!("job completed");
                self.gate.emit(|| {
                    observer.on_phase_change(status);
                    observer.on_complete(status);
                });
                false
            }
            Step::Failed => {
                info!(error = ?status.error_message, "job failed");
                self.gate.emit(|| observer.on_phase_change(status));
                false
            }
        }
    }
}
