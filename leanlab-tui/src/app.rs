//! Application state: single-owner, main-thread only.
//!
//! All TUI state lives here. The worker thread communicates via channels.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use leanlab_core::job::{JobHandle, JobSpec};
use leanlab_core::status::{JobStatus, Phase};

use crate::worker::{WorkerCommand, WorkerResponse};

/// Which panel is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Panel {
    Job,
    Results,
    Help,
}

impl Panel {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            Panel::Job => 0,
            Panel::Results => 1,
            Panel::Help => 2,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Panel::Job),
            1 => Some(Panel::Results),
            2 => Some(Panel::Help),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Panel::Job => "Job",
            Panel::Results => "Results",
            Panel::Help => "Help",
        }
    }

    pub fn next(self) -> Panel {
        Panel::from_index((self.index() + 1) % Self::COUNT).unwrap_or(Panel::Job)
    }

    pub fn prev(self) -> Panel {
        Panel::from_index((self.index() + Self::COUNT - 1) % Self::COUNT).unwrap_or(Panel::Job)
    }
}

/// Status message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// An entry in the error history.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub timestamp: NaiveDateTime,
    pub message: String,
}

/// Editable fields of the job form, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Symbol,
    StartDate,
    EndDate,
    Capital,
    CodePath,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::Name,
        FormField::Symbol,
        FormField::StartDate,
        FormField::EndDate,
        FormField::Capital,
        FormField::CodePath,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Name => "Strategy name",
            FormField::Symbol => "Symbol",
            FormField::StartDate => "Start date",
            FormField::EndDate => "End date",
            FormField::Capital => "Initial capital",
            FormField::CodePath => "Algorithm file",
        }
    }
}

/// Job submission form. Values stay as typed until submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobForm {
    pub name: String,
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub capital: String,
    pub code_path: String,
    pub cursor: usize,
    pub editing: bool,
}

impl Default for JobForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            symbol: "SPY".into(),
            start_date: "2020-01-01".into(),
            end_date: "2023-12-31".into(),
            capital: "100000".into(),
            code_path: "main.py".into(),
            cursor: 0,
            editing: false,
        }
    }
}

impl JobForm {
    pub fn active_field(&self) -> FormField {
        FormField::ALL[self.cursor.min(FormField::ALL.len() - 1)]
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Name => &self.name,
            FormField::Symbol => &self.symbol,
            FormField::StartDate => &self.start_date,
            FormField::EndDate => &self.end_date,
            FormField::Capital => &self.capital,
            FormField::CodePath => &self.code_path,
        }
    }

    pub fn value_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Name => &mut self.name,
            FormField::Symbol => &mut self.symbol,
            FormField::StartDate => &mut self.start_date,
            FormField::EndDate => &mut self.end_date,
            FormField::Capital => &mut self.capital,
            FormField::CodePath => &mut self.code_path,
        }
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < FormField::ALL.len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Build a job request from the form, reading the algorithm file from disk.
    pub fn to_spec(&self) -> Result<JobSpec, String> {
        let parse_date = |field: FormField, raw: &str| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| format!("{}: expected YYYY-MM-DD, got '{raw}'", field.label()))
        };
        let start_date = parse_date(FormField::StartDate, &self.start_date)?;
        let end_date = parse_date(FormField::EndDate, &self.end_date)?;
        let initial_capital: f64 = self
            .capital
            .trim()
            .replace(',', "")
            .parse()
            .map_err(|_| format!("Initial capital: not a number: '{}'", self.capital))?;

        let path = self.code_path.trim();
        let code = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read algorithm file {path}: {e}"))?;

        let spec = JobSpec {
            code,
            name: self.name.trim().to_string(),
            symbol: self.symbol.trim().to_uppercase(),
            start_date,
            end_date,
            initial_capital,
            strategy_id: None,
        };
        spec.validate().map_err(|e| e.to_string())?;
        Ok(spec)
    }
}

/// Job progress as last reported by the worker.
#[derive(Debug, Default)]
pub struct JobPanelState {
    pub status: JobStatus,
    pub handle: Option<JobHandle>,
    pub submitted: bool,
}

/// Results panel state.
#[derive(Debug, Default)]
pub struct ResultsPanelState {
    pub results: Option<Value>,
    pub scroll: usize,
}

/// Top-level application state.
pub struct AppState {
    // Navigation
    pub active_panel: Panel,
    pub running: bool,

    // Panel states
    pub form: JobForm,
    pub job: JobPanelState,
    pub results: ResultsPanelState,

    // Worker communication
    pub worker_tx: Sender<WorkerCommand>,
    pub worker_rx: Receiver<WorkerResponse>,

    // Cross-cutting
    pub status_message: Option<(String, StatusLevel)>,
    pub error_history: VecDeque<ErrorRecord>,

    pub state_path: PathBuf,
}

impl AppState {
    pub fn new(
        worker_tx: Sender<WorkerCommand>,
        worker_rx: Receiver<WorkerResponse>,
        state_path: PathBuf,
    ) -> Self {
        Self {
            active_panel: Panel::Job,
            running: true,
            form: JobForm::default(),
            job: JobPanelState::default(),
            results: ResultsPanelState::default(),
            worker_tx,
            worker_rx,
            status_message: None,
            error_history: VecDeque::with_capacity(50),
            state_path,
        }
    }

    /// Push an error to the history, capping at 50.
    pub fn push_error(&mut self, message: String) {
        self.error_history.push_front(ErrorRecord {
            timestamp: chrono::Local::now().naive_local(),
            message: message.clone(),
        });
        if self.error_history.len() > 50 {
            self.error_history.pop_back();
        }
        self.status_message = Some((message, StatusLevel::Error));
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some((msg.into(), StatusLevel::Info));
    }

    pub fn set_success(&mut self, msg: impl Into<String>) {
        self.status_message = Some((msg.into(), StatusLevel::Success));
    }

    pub fn set_warning(&mut self, msg: impl Into<String>) {
        self.status_message = Some((msg.into(), StatusLevel::Warning));
    }

    pub fn is_job_running(&self) -> bool {
        self.job.submitted && !self.job.status.is_terminal() && self.job.status.phase != Phase::Idle
    }

    /// Validate the form and hand the job to the worker.
    pub fn submit(&mut self) {
        match self.form.to_spec() {
            Ok(spec) => {
                self.results = ResultsPanelState::default();
                self.job.submitted = true;
                self.job.status = JobStatus::entering(Phase::CreatingProject);
                self.send(WorkerCommand::Run(Box::new(spec)));
                self.set_status("Submitting job...");
            }
            Err(msg) => self.set_warning(msg),
        }
    }

    pub fn retry(&mut self) {
        if !self.job.submitted {
            self.set_warning("Nothing to retry yet");
            return;
        }
        self.results = ResultsPanelState::default();
        self.send(WorkerCommand::Retry);
        self.set_status("Retrying job...");
    }

    pub fn cancel(&mut self) {
        if self.is_job_running() {
            self.send(WorkerCommand::Cancel);
            self.set_warning("Job cancelled");
        }
    }

    pub fn refresh(&mut self) {
        if self.is_job_running() {
            self.send(WorkerCommand::Refresh);
            self.set_status("Refreshing status...");
        }
    }

    fn send(&mut self, cmd: WorkerCommand) {
        if self.worker_tx.send(cmd).is_err() {
            self.push_error("background worker stopped".into());
        }
    }

    /// Fold one worker response into the state.
    pub fn apply_response(&mut self, resp: WorkerResponse) {
        match resp {
            WorkerResponse::Started(handle) => {
                self.set_status(format!("Tracking {handle}"));
                self.job.handle = Some(handle);
            }
            WorkerResponse::Status(status) => {
                if status.phase == Phase::Completed && self.job.status.phase != Phase::Completed {
                    self.set_success("Backtest completed");
                }
                if status.phase == Phase::Idle {
                    self.job.handle = None;
                }
                self.job.status = status;
            }
            WorkerResponse::Failed(msg) => self.push_error(msg),
            WorkerResponse::Results(results) => {
                self.results.results = Some(results);
                self.results.scroll = 0;
            }
            WorkerResponse::Navigate => {
                self.active_panel = Panel::Results;
            }
        }
    }
}
