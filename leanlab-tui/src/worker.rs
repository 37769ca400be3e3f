//! Background worker thread: owns the job orchestrator.
//!
//! Communication with the TUI main thread is via `mpsc` channels. Between
//! commands the worker pumps the orchestrator every tick and forwards what
//! it reports.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use leanlab_core::job::{JobHandle, JobSpec};
use leanlab_core::status::JobStatus;
use leanlab_runner::{Orchestrator, OrchestratorEvent};

/// How long the worker waits for a command before pumping again.
const TICK: Duration = Duration::from_millis(100);

/// Commands sent from the TUI to the worker.
#[derive(Debug)]
pub enum WorkerCommand {
    Run(Box<JobSpec>),
    Retry,
    Cancel,
    Refresh,
    Shutdown,
}

/// Responses sent from the worker back to the TUI.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    Started(JobHandle),
    Status(JobStatus),
    Failed(String),
    Results(Value),
    /// Completion delay elapsed; show the results panel.
    Navigate,
}

impl From<OrchestratorEvent> for WorkerResponse {
    fn from(event: OrchestratorEvent) -> Self {
        match event {
            OrchestratorEvent::Status(status) => WorkerResponse::Status(status),
            OrchestratorEvent::Failed(msg) => WorkerResponse::Failed(msg),
            OrchestratorEvent::ResultsReady(results) => WorkerResponse::Results(results),
            OrchestratorEvent::Navigate => WorkerResponse::Navigate,
        }
    }
}

/// Spawn the background worker thread.
pub fn spawn_worker(
    orchestrator: Orchestrator,
    rx: Receiver<WorkerCommand>,
    tx: Sender<WorkerResponse>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("leanlab-worker".into())
        .spawn(move || worker_loop(orchestrator, rx, tx))
}

fn worker_loop(mut orchestrator: Orchestrator, rx: Receiver<WorkerCommand>, tx: Sender<WorkerResponse>) {
    loop {
        match rx.recv_timeout(TICK) {
            Ok(WorkerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(cmd) => handle_command(&mut orchestrator, cmd, &tx),
            Err(RecvTimeoutError::Timeout) => {}
        }
        for event in orchestrator.pump() {
            if tx.send(event.into()).is_err() {
                return;
            }
        }
    }
    orchestrator.cancel();
    debug!("worker stopped");
}

fn handle_command(orchestrator: &mut Orchestrator, cmd: WorkerCommand, tx: &Sender<WorkerResponse>) {
    let outcome = match cmd {
        WorkerCommand::Run(spec) => {
            info!(name = %spec.name, symbol = %spec.symbol, "run requested");
            Some(orchestrator.run(*spec))
        }
        WorkerCommand::Retry => Some(orchestrator.retry()),
        WorkerCommand::Cancel => {
            orchestrator.cancel();
            None
        }
        WorkerCommand::Refresh => {
            orchestrator.refresh();
            return;
        }
        WorkerCommand::Shutdown => return,
    };

    match outcome {
        Some(Ok(handle)) => {
            let _ = tx.send(WorkerResponse::Started(handle));
        }
        Some(Err(e)) => {
            let _ = tx.send(WorkerResponse::Failed(e.to_string()));
        }
        None => {}
    }
    let _ = tx.send(WorkerResponse::Status(orchestrator.status().clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use serde_json::json;

    use leanlab_core::error::{PollingError, SubmissionError};
    use leanlab_core::job::RemoteId;
    use leanlab_core::service::JobService;
    use leanlab_core::status::{BacktestProgress, CompileProgress, Phase};
    use leanlab_core::ManualClock;
    use leanlab_runner::OrchestratorConfig;

    /// Backend whose backtests finish on the first query.
    struct InstantBackend;

    impl JobService for InstantBackend {
        fn submit(&self, _spec: &JobSpec) -> Result<JobHandle, SubmissionError> {
            Ok(JobHandle::new(4).with_backtest(40))
        }

        fn launch_backtest(&self, _handle: &JobHandle) -> Result<RemoteId, SubmissionError> {
            Ok(RemoteId::Int(40))
        }

        fn compile_status(&self, _handle: &JobHandle) -> Result<CompileProgress, PollingError> {
            Ok(CompileProgress {
                raw_state: "BuildSuccess".into(),
            })
        }

        fn backtest_status(&self, _handle: &JobHandle) -> Result<BacktestProgress, PollingError> {
            Ok(BacktestProgress {
                raw_status: "Completed".into(),
                progress: 100.0,
                completed: true,
            })
        }

        fn fetch_results(&self, _handle: &JobHandle) -> Result<Value, PollingError> {
            Ok(json!({"statistics": {"Net Profit": "12%"}}))
        }
    }

    fn spec() -> JobSpec {
        JobSpec {
            code: "pass".into(),
            name: "demo".into(),
            symbol: "SPY".into(),
            start_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            initial_capital: 10_000.0,
            strategy_id: None,
        }
    }

    fn start() -> (Sender<WorkerCommand>, Receiver<WorkerResponse>, JoinHandle<()>) {
        let config = OrchestratorConfig {
            navigate_delay: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        let orchestrator =
            Orchestrator::new(Arc::new(InstantBackend), Arc::new(ManualClock::new()), config);
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();
        let handle = spawn_worker(orchestrator, cmd_rx, resp_tx).unwrap();
        (cmd_tx, resp_rx, handle)
    }

    fn collect_until_navigate(rx: &Receiver<WorkerResponse>) -> Vec<WorkerResponse> {
        let mut out = Vec::new();
        while let Ok(resp) = rx.recv_timeout(Duration::from_secs(5)) {
            let done = resp == WorkerResponse::Navigate;
            out.push(resp);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn run_reports_through_to_navigation() {
        let (tx, rx, handle) = start();
        tx.send(WorkerCommand::Run(Box::new(spec()))).unwrap();

        let responses = collect_until_navigate(&rx);
        assert_eq!(
            responses.first(),
            Some(&WorkerResponse::Started(JobHandle::new(4).with_backtest(40)))
        );
        assert!(responses.iter().any(|r| matches!(
            r,
            WorkerResponse::Status(s) if s.phase == Phase::Completed
        )));
        assert!(responses.iter().any(|r| matches!(r, WorkerResponse::Results(_))));
        assert_eq!(responses.last(), Some(&WorkerResponse::Navigate));

        tx.send(WorkerCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn retry_without_job_reports_failure() {
        let (tx, rx, handle) = start();
        tx.send(WorkerCommand::Retry).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, WorkerResponse::Failed("no previous job to retry".into()));
        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn cancel_reports_idle() {
        let (tx, rx, handle) = start();
        tx.send(WorkerCommand::Cancel).unwrap();
        let status = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(status, WorkerResponse::Status(JobStatus::idle()));
        tx.send(WorkerCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }
}
