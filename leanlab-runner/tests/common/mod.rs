//! Shared fakes for poller and orchestrator tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDate;
use serde_json::{json, Value};

use leanlab_core::error::{PollingError, SubmissionError};
use leanlab_core::job::{JobHandle, JobSpec, RemoteId, SharedHandle};
use leanlab_core::service::JobService;
use leanlab_core::status::{
    normalize_backtest_status, normalize_compile_status, BacktestProgress, CompileProgress,
    JobStatus, Phase,
};
use leanlab_runner::JobObserver;

pub fn spec(name: &str) -> JobSpec {
    JobSpec {
        code: "class SmaCross(QCAlgorithm): pass".into(),
        name: name.into(),
        symbol: "SPY".into(),
        start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        initial_capital: 100_000.0,
        strategy_id: None,
    }
}

pub fn shared(handle: JobHandle) -> SharedHandle {
    Arc::new(RwLock::new(handle))
}

/// `JobService` that replays scripted responses. When a script runs dry the
/// remote side reports "still pending".
pub struct ScriptedService {
    submit: Mutex<Result<JobHandle, SubmissionError>>,
    launch: Mutex<Result<RemoteId, SubmissionError>>,
    compile: Mutex<VecDeque<Result<CompileProgress, PollingError>>>,
    backtest: Mutex<VecDeque<Result<BacktestProgress, PollingError>>>,
    results: Mutex<Result<Value, PollingError>>,
    pub submit_calls: AtomicUsize,
    pub launch_calls: AtomicUsize,
    pub compile_calls: AtomicUsize,
    pub backtest_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            submit: Mutex::new(Ok(JobHandle::new(1).with_backtest(9))),
            launch: Mutex::new(Ok(RemoteId::Int(9))),
            compile: Mutex::new(VecDeque::new()),
            backtest: Mutex::new(VecDeque::new()),
            results: Mutex::new(Ok(json!({"statistics": {"Sharpe Ratio": "1.2"}}))),
            submit_calls: AtomicUsize::new(0),
            launch_calls: AtomicUsize::new(0),
            compile_calls: AtomicUsize::new(0),
            backtest_calls: AtomicUsize::new(0),
        }
    }

    pub fn submit_returns(self, result: Result<JobHandle, SubmissionError>) -> Self {
        *self.submit.lock().unwrap() = result;
        self
    }

    pub fn launch_returns(self, result: Result<RemoteId, SubmissionError>) -> Self {
        *self.launch.lock().unwrap() = result;
        self
    }

    pub fn compile(self, body: Value) -> Self {
        let p = normalize_compile_status(&body).unwrap();
        self.compile.lock().unwrap().push_back(Ok(p));
        self
    }

    pub fn backtest(self, body: Value) -> Self {
        let p = normalize_backtest_status(&body).unwrap();
        self.backtest.lock().unwrap().push_back(Ok(p));
        self
    }

    pub fn backtest_error(self, err: PollingError) -> Self {
        self.backtest.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl JobService for ScriptedService {
    fn submit(&self, _spec: &JobSpec) -> Result<JobHandle, SubmissionError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit.lock().unwrap().clone()
    }

    fn launch_backtest(&self, _handle: &JobHandle) -> Result<RemoteId, SubmissionError> {
        self.launch_calls.fetch_add(1, Ordering::SeqCst);
        self.launch.lock().unwrap().clone()
    }

    fn compile_status(&self, _handle: &JobHandle) -> Result<CompileProgress, PollingError> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        self.compile.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(CompileProgress {
                raw_state: "InQueue".into(),
            })
        })
    }

    fn backtest_status(&self, _handle: &JobHandle) -> Result<BacktestProgress, PollingError> {
        self.backtest_calls.fetch_add(1, Ordering::SeqCst);
        self.backtest.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(BacktestProgress {
                raw_status: "Running".into(),
                progress: 0.0,
                completed: false,
            })
        })
    }

    fn fetch_results(&self, _handle: &JobHandle) -> Result<Value, PollingError> {
        self.results.lock().unwrap().clone()
    }
}

/// Service whose first backtest query blocks until released, then reports
/// completion. Later queries complete immediately.
pub struct BlockingService {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
    pub backtest_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
}

pub struct BlockingControls {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl BlockingService {
    pub fn new() -> (Self, BlockingControls) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let service = Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            backtest_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        };
        (
            service,
            BlockingControls {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl JobService for BlockingService {
    fn submit(&self, _spec: &JobSpec) -> Result<JobHandle, SubmissionError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(JobHandle::new(n + 1).with_backtest(100 + n))
    }

    fn launch_backtest(&self, _handle: &JobHandle) -> Result<RemoteId, SubmissionError> {
        Err(SubmissionError::Rejected("not used".into()))
    }

    fn compile_status(&self, _handle: &JobHandle) -> Result<CompileProgress, PollingError> {
        Err(PollingError::MissingId("compile"))
    }

    fn backtest_status(&self, _handle: &JobHandle) -> Result<BacktestProgress, PollingError> {
        let call = self.backtest_calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
        }
        Ok(BacktestProgress {
            raw_status: "Completed".into(),
            progress: 100.0,
            completed: true,
        })
    }

    fn fetch_results(&self, handle: &JobHandle) -> Result<Value, PollingError> {
        Ok(json!({"project_id": handle.project_id.to_string()}))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Phase(JobStatus),
    Complete(JobStatus),
}

/// Observer that records every callback.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub log: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<JobStatus> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Phase(s) => Some(s),
                Recorded::Complete(_) => None,
            })
            .collect()
    }

    pub fn completions(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, Recorded::Complete(_)))
            .count()
    }

    pub fn errors(&self) -> Vec<JobStatus> {
        self.phases()
            .into_iter()
            .filter(|s| s.phase == Phase::Error)
            .collect()
    }
}

impl JobObserver for RecordingObserver {
    fn on_phase_change(&mut self, status: &JobStatus) {
        self.log.lock().unwrap().push(Recorded::Phase(status.clone()));
    }

    fn on_complete(&mut self, status: &JobStatus) {
        self.log.lock().unwrap().push(Recorded::Complete(status.clone()));
    }
}
