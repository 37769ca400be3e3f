//! Job lifecycle owner: submit, poll, fetch results, navigate.
//!
//! The orchestrator is single-owner. Its poller reports through an `mpsc`
//! channel and `pump()` drains that channel on the owner's thread, so all
//! state changes happen in one place. Each submission bumps a generation
//! number; events from a superseded job are dropped on receipt.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use leanlab_core::error::SubmissionError;
use leanlab_core::job::{JobHandle, JobSpec, SharedHandle};
use leanlab_core::service::JobService;
use leanlab_core::status::{JobStatus, Phase};
use leanlab_core::Clock;

use crate::poller::{JobObserver, Poller, PollerConfig, PollerHandle};

/// Errors from starting a job.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Submission(#[from] SubmissionError),
    #[error("failed to start poll thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("no previous job to retry")]
    NothingToRetry,
}

/// What the front end should react to after a `pump()`.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Status(JobStatus),
    Failed(String),
    ResultsReady(Value),
    /// Show the results view.
    Navigate,
}

#[derive(Debug, Clone)]
enum PollEventKind {
    PhaseChanged(JobStatus),
    Completed(JobStatus),
}

#[derive(Debug, Clone)]
struct PollEvent {
    generation: u64,
    kind: PollEventKind,
}

/// Forwards poller callbacks into the orchestrator's channel.
struct ChannelObserver {
    tx: Sender<PollEvent>,
    generation: u64,
}

impl JobObserver for ChannelObserver {
    fn on_phase_change(&mut self, status: &JobStatus) {
        let _ = self.tx.send(PollEvent {
            generation: self.generation,
            kind: PollEventKind::PhaseChanged(status.clone()),
        });
    }

    fn on_complete(&mut self, status: &JobStatus) {
        let _ = self.tx.send(PollEvent {
            generation: self.generation,
            kind: PollEventKind::Completed(status.clone()),
        });
    }
}

struct ActiveJob {
    handle: SharedHandle,
    poller: PollerHandle,
    launch_requested: bool,
}

impl ActiveJob {
    fn snapshot(&self) -> JobHandle {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub poller: PollerConfig,
    /// Pause between completion and navigation, so the final status renders.
    pub navigate_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            navigate_delay: Duration::from_millis(2000),
        }
    }
}

pub struct Orchestrator {
    service: Arc<dyn JobService>,
    clock: Arc<dyn Clock>,
    poller: Poller,
    navigate_delay: Duration,
    events_tx: Sender<PollEvent>,
    events_rx: Receiver<PollEvent>,
    generation: u64,
    active: Option<ActiveJob>,
    last_spec: Option<JobSpec>,
    status: JobStatus,
    results: Option<Value>,
    navigate_at: Option<Duration>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn JobService>, clock: Arc<dyn Clock>, config: OrchestratorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let poller = Poller::new(Arc::clone(&service), Arc::clone(&clock), config.poller);
        Self {
            service,
            clock,
            poller,
            navigate_delay: config.navigate_delay,
            events_tx,
            events_rx,
            generation: 0,
            active: None,
            last_spec: None,
            status: JobStatus::idle(),
            results: None,
            navigate_at: None,
        }
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn results(&self) -> Option<&Value> {
        self.results.as_ref()
    }

    pub fn last_spec(&self) -> Option<&JobSpec> {
        self.last_spec.as_ref()
    }

    pub fn handle(&self) -> Option<JobHandle> {
        self.active.as_ref().map(ActiveJob::snapshot)
    }

    /// True while a poller exists for a non-terminal job.
    pub fn is_running(&self) -> bool {
        self.active.is_some() && !self.status.is_terminal()
    }

    /// Submit `spec` and start tracking it. Any job in flight is cancelled first.
    pub fn run(&mut self, spec: JobSpec) -> Result<JobHandle, RunError> {
        self.stop_active();
        self.generation += 1;
        self.results = None;
        self.navigate_at = None;
        self.last_spec = Some(spec.clone());

        if let Err(e) = spec.validate() {
            self.status = JobStatus::idle().fail(e.to_string());
            return Err(e.into());
        }

        self.status = JobStatus::entering(Phase::CreatingProject);
        let submitted_at = self.clock.now();
        let handle = match self.service.submit(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, status = ?e.status(), "submission failed");
                self.status = self.status.fail(e.to_string());
                return Err(e.into());
            }
        };
        if !handle.is_trackable() {
            let e = SubmissionError::MalformedResponse(format!("{handle} has nothing to poll"));
            self.status = self.status.fail(e.to_string());
            return Err(e.into());
        }

        self.status = self.status.advance(Phase::Compiling, "", Phase::Compiling.baseline_progress());
        let shared: SharedHandle = Arc::new(RwLock::new(handle.clone()));
        let observer = ChannelObserver {
            tx: self.events_tx.clone(),
            generation: self.generation,
        };
        let poller = match self.poller.start(Arc::clone(&shared), submitted_at, Box::new(observer)) {
            Ok(poller) => poller,
            Err(e) => {
                self.status = self.status.fail(e.to_string());
                return Err(e.into());
            }
        };

        info!(%handle, generation = self.generation, "job started");
        self.active = Some(ActiveJob {
            handle: shared,
            poller,
            launch_requested: false,
        });
        Ok(handle)
    }

    /// Resubmit the last job from scratch.
    pub fn retry(&mut self) -> Result<JobHandle, RunError> {
        let spec = self.last_spec.clone().ok_or(RunError::NothingToRetry)?;
        info!(name = %spec.name, "retrying job");
        self.run(spec)
    }

    /// Stop tracking the current job and return to idle.
    pub fn cancel(&mut self) {
        if self.active.is_some() {
            info!("job cancelled");
        }
        self.stop_active();
        self.generation += 1;
        self.navigate_at = None;
        self.status = JobStatus::idle();
    }

    /// Ask the active poller to query now instead of at the next interval.
    pub fn refresh(&self) {
        if let Some(active) = &self.active {
            active.poller.poll_now();
        }
    }

    /// Drain poller events and fire a due navigation.
    pub fn pump(&mut self) -> Vec<OrchestratorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event, &mut out);
        }
        self.check_navigation(&mut out);
        out
    }

    /// Block up to `max_wait` for the next event (or a due navigation), then pump.
    pub fn wait(&mut self, max_wait: Duration) -> Vec<OrchestratorEvent> {
        let mut wait = max_wait;
        if let Some(at) = self.navigate_at {
            wait = wait.min(at.saturating_sub(self.clock.now()));
        }

        let mut out = Vec::new();
        match self.events_rx.recv_timeout(wait) {
            Ok(event) => self.handle_event(event, &mut out),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
        out.extend(self.pump());
        out
    }

    fn handle_event(&mut self, event: PollEvent, out: &mut Vec<OrchestratorEvent>) {
        if event.generation != self.generation {
            return;
        }
        match event.kind {
            PollEventKind::PhaseChanged(status) => {
                self.status = status.clone();
                out.push(OrchestratorEvent::Status(status.clone()));
                match status.phase {
                    Phase::RunningBacktest => self.ensure_backtest_launched(out),
                    Phase::Error => {
                        let msg = status.error_message.unwrap_or_else(|| "job failed".into());
                        out.push(OrchestratorEvent::Failed(msg));
                    }
                    _ => {}
                }
            }
            PollEventKind::Completed(status) => {
                self.status = status;
                self.attach_results(out);
                self.navigate_at = Some(self.clock.now() + self.navigate_delay);
            }
        }
    }

    /// Compilation finished but the backend did not start a backtest yet.
    fn ensure_backtest_launched(&mut self, out: &mut Vec<OrchestratorEvent>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.launch_requested || active.snapshot().backtest_id.is_some() {
            return;
        }
        active.launch_requested = true;

        match self.service.launch_backtest(&active.snapshot()) {
            Ok(id) => {
                active
                    .handle
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .backtest_id = Some(id);
            }
            Err(e) => {
                warn!(error = %e, "backtest launch failed");
                active.poller.cancel();
                self.generation += 1;
                self.status = self.status.fail(e.to_string());
                out.push(OrchestratorEvent::Status(self.status.clone()));
                out.push(OrchestratorEvent::Failed(e.to_string()));
            }
        }
    }

    fn attach_results(&mut self, out: &mut Vec<OrchestratorEvent>) {
        let Some(active) = &self.active else {
            return;
        };
        match self.service.fetch_results(&active.snapshot()) {
            Ok(results) => {
                self.results = Some(results.clone());
                out.push(OrchestratorEvent::ResultsReady(results));
            }
            Err(e) => warn!(error = %e, "could not fetch backtest results"),
        }
    }

    fn check_navigation(&mut self, out: &mut Vec<OrchestratorEvent>) {
        if let Some(at) = self.navigate_at {
            if self.clock.now() >= at {
                self.navigate_at = None;
                out.push(OrchestratorEvent::Navigate);
            }
        }
    }

    fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.poller.cancel();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop_active();
    }
}
