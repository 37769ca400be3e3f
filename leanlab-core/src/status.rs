//! Job phases, the normalized `JobStatus`, and remote response normalization.
//!
//! The backend is inconsistent about response shape: backtest progress is
//! sometimes flat (`{status, progress, completed}`) and sometimes nested under
//! `backtest`; compile status is `{state}` or nested under `compile`. Both are
//! normalized here, on receipt, into fixed structs. Nothing past this module
//! sees raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PollingError;

/// Lifecycle stage of a job. Declaration order is the happy-path order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    CreatingProject,
    Compiling,
    CompilationWaiting,
    RunningBacktest,
    BacktestWaiting,
    Completed,
    Error,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::CreatingProject => "Creating project",
            Phase::Compiling => "Compiling",
            Phase::CompilationWaiting => "Waiting for compilation",
            Phase::RunningBacktest => "Starting backtest",
            Phase::BacktestWaiting => "Running backtest",
            Phase::Completed => "Completed",
            Phase::Error => "Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    /// Progress shown on entering the phase.
    pub fn baseline_progress(self) -> f64 {
        match self {
            Phase::Idle => 0.0,
            Phase::CreatingProject => 5.0,
            Phase::Compiling => 15.0,
            Phase::CompilationWaiting => 25.0,
            Phase::RunningBacktest | Phase::BacktestWaiting => 50.0,
            Phase::Completed => 100.0,
            Phase::Error => 0.0,
        }
    }
}

/// Snapshot of a job, recomputed on every poll tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub phase: Phase,
    /// Remote state string as last reported (empty before the first poll).
    pub raw_state: String,
    /// 0–100, non-decreasing over a job's lifetime.
    pub progress: f64,
    pub error_message: Option<String>,
    pub completed: bool,
}

impl JobStatus {
    pub fn idle() -> Self {
        Self::entering(Phase::Idle)
    }

    /// Fresh status at the baseline progress of `phase`.
    pub fn entering(phase: Phase) -> Self {
        Self {
            phase,
            raw_state: String::new(),
            progress: phase.baseline_progress(),
            error_message: None,
            completed: phase == Phase::Completed,
        }
    }

    /// Move to `phase`, never letting progress go backwards.
    pub fn advance(&self, phase: Phase, raw_state: &str, progress: f64) -> Self {
        Self {
            phase,
            raw_state: raw_state.to_string(),
            progress: clamp_progress(self.progress, progress),
            error_message: None,
            completed: phase == Phase::Completed,
        }
    }

    /// Terminal failure. Progress stays where it was.
    pub fn fail(&self, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Error,
            raw_state: self.raw_state.clone(),
            progress: self.progress,
            error_message: Some(message.into()),
            completed: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// `max(previous, new)`, bounded to 0–100.
pub fn clamp_progress(previous: f64, new: f64) -> f64 {
    let new = if new.is_finite() { new } else { previous };
    previous.max(new).clamp(0.0, 100.0)
}

/// Ceiling for a running backtest; 100 is reserved for `Completed`.
pub const MAX_RUNNING_PROGRESS: f64 = 99.5;

/// Overall progress while the backtest runs: the second half of the bar.
/// Stays below 100 until the remote side reports completion.
pub fn backtest_overall_progress(remote_pct: f64) -> f64 {
    (50.0 + remote_pct / 2.0).clamp(50.0, MAX_RUNNING_PROGRESS)
}

// ── Compile status ───────────────────────────────────────────────────

/// Normalized compile status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileProgress {
    pub raw_state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    Succeeded,
    Failed,
    Pending,
}

impl CompileProgress {
    pub fn outcome(&self) -> CompileOutcome {
        let state = self.raw_state.trim().to_ascii_lowercase();
        match state.as_str() {
            "completed" | "buildsuccess" | "success" => CompileOutcome::Succeeded,
            "failed" | "builderror" | "error" => CompileOutcome::Failed,
            _ => CompileOutcome::Pending,
        }
    }
}

/// Normalize a compile-status body: `{state}` or `{compile: {state}}`.
pub fn normalize_compile_status(body: &Value) -> Result<CompileProgress, PollingError> {
    let obj = payload(body, "compile")?;
    let state = obj
        .get("state")
        .or_else(|| obj.get("status"))
        .and_then(Value::as_str)
        .ok_or_else(|| PollingError::Malformed("compile status has no state".into()))?;
    Ok(CompileProgress {
        raw_state: state.to_string(),
    })
}

// ── Backtest status ──────────────────────────────────────────────────

/// Normalized backtest status.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestProgress {
    pub raw_status: String,
    /// Remote progress in percent, 0–100.
    pub progress: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BacktestOutcome {
    Completed,
    Failed,
    Running { progress: f64 },
}

impl BacktestProgress {
    pub fn outcome(&self) -> BacktestOutcome {
        let status = self.raw_status.trim();
        if self.completed || status == "Completed" || status == "Completed." {
            return BacktestOutcome::Completed;
        }
        let lower = status.to_ascii_lowercase();
        if lower.starts_with("failed") || lower.contains("error") {
            return BacktestOutcome::Failed;
        }
        BacktestOutcome::Running {
            progress: self.progress,
        }
    }
}

/// Normalize a backtest-progress body: flat or nested under `backtest`.
pub fn normalize_backtest_status(body: &Value) -> Result<BacktestProgress, PollingError> {
    let obj = payload(body, "backtest")?;

    let completed = obj
        .get("completed")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let raw_status = match obj.get("status") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None if completed => String::new(),
        Some(other) => {
            return Err(PollingError::Malformed(format!(
                "backtest status is not a string: {other}"
            )))
        }
        None => return Err(PollingError::Malformed("backtest status missing".into())),
    };

    let progress = obj.get("progress").map(parse_percent).unwrap_or(0.0);

    Ok(BacktestProgress {
        raw_status,
        progress,
        completed,
    })
}

/// Pick the object that carries the status, surfacing backend-side errors.
fn payload<'a>(body: &'a Value, nested_key: &str) -> Result<&'a Map<String, Value>, PollingError> {
    let root = body
        .as_object()
        .ok_or_else(|| PollingError::Malformed(format!("expected a JSON object, got {body}")))?;

    if root.get("success").and_then(Value::as_bool) == Some(false) {
        let msg = root
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        return Err(PollingError::Rejected(msg.to_string()));
    }

    match root.get(nested_key) {
        Some(Value::Object(inner)) => Ok(inner),
        _ => Ok(root),
    }
}

/// Remote progress arrives as a percent, a 0–1 fraction, or a numeric string.
fn parse_percent(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    let raw = if raw.is_finite() { raw } else { 0.0 };
    let pct = if raw > 0.0 && raw < 1.0 { raw * 100.0 } else { raw };
    pct.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phases_order_along_happy_path() {
        assert!(Phase::Idle < Phase::CreatingProject);
        assert!(Phase::CompilationWaiting < Phase::RunningBacktest);
        assert!(Phase::BacktestWaiting < Phase::Completed);
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Error.is_terminal());
        assert!(!Phase::BacktestWaiting.is_terminal());
    }

    #[test]
    fn advance_never_regresses() {
        let s = JobStatus::entering(Phase::BacktestWaiting).advance(Phase::BacktestWaiting, "Running", 80.0);
        let next = s.advance(Phase::BacktestWaiting, "Running", 60.0);
        assert_eq!(next.progress, 80.0);
    }

    #[test]
    fn fail_keeps_progress() {
        let s = JobStatus::entering(Phase::BacktestWaiting).advance(Phase::BacktestWaiting, "Running", 70.0);
        let f = s.fail("Backtest failed");
        assert_eq!(f.phase, Phase::Error);
        assert_eq!(f.progress, 70.0);
        assert_eq!(f.error_message.as_deref(), Some("Backtest failed"));
    }

    #[test]
    fn overall_progress_maps_to_second_half() {
        assert_eq!(backtest_overall_progress(40.0), 70.0);
        assert_eq!(backtest_overall_progress(0.0), 50.0);
        assert_eq!(backtest_overall_progress(99.0), 99.5);
        assert_eq!(backtest_overall_progress(100.0), MAX_RUNNING_PROGRESS);
        assert!(backtest_overall_progress(100.0) < 100.0);
        assert_eq!(backtest_overall_progress(-10.0), 50.0);
    }

    #[test]
    fn flat_backtest_status() {
        let p = normalize_backtest_status(&json!({"status": "Running", "progress": 40})).unwrap();
        assert_eq!(p.raw_status, "Running");
        assert_eq!(p.progress, 40.0);
        assert_eq!(p.outcome(), BacktestOutcome::Running { progress: 40.0 });
    }

    #[test]
    fn nested_backtest_status() {
        let body = json!({"success": true, "backtest": {"status": "Completed.", "progress": 1.0}});
        let p = normalize_backtest_status(&body).unwrap();
        assert_eq!(p.outcome(), BacktestOutcome::Completed);
    }

    #[test]
    fn completed_flag_wins_without_status() {
        let p = normalize_backtest_status(&json!({"completed": true})).unwrap();
        assert_eq!(p.outcome(), BacktestOutcome::Completed);
    }

    #[test]
    fn fractional_progress_scaled() {
        let p = normalize_backtest_status(&json!({"status": "In Progress...", "progress": 0.25})).unwrap();
        assert_eq!(p.progress, 25.0);
        let p = normalize_backtest_status(&json!({"status": "Running", "progress": "35%"})).unwrap();
        assert_eq!(p.progress, 35.0);
    }

    #[test]
    fn runtime_error_is_failure() {
        let p = normalize_backtest_status(&json!({"status": "Runtime Error", "progress": 10})).unwrap();
        assert_eq!(p.outcome(), BacktestOutcome::Failed);
        let p = normalize_backtest_status(&json!({"status": "failed"})).unwrap();
        assert_eq!(p.outcome(), BacktestOutcome::Failed);
    }

    #[test]
    fn missing_status_is_malformed() {
        let err = normalize_backtest_status(&json!({"progress": 10})).unwrap_err();
        assert!(matches!(err, PollingError::Malformed(_)));
        let err = normalize_backtest_status(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, PollingError::Malformed(_)));
    }

    #[test]
    fn backend_error_surfaces_as_rejected() {
        let err = normalize_backtest_status(&json!({"success": false, "error": "no such backtest"}))
            .unwrap_err();
        assert_eq!(err, PollingError::Rejected("no such backtest".into()));
    }

    #[test]
    fn compile_states() {
        let done = normalize_compile_status(&json!({"state": "BuildSuccess"})).unwrap();
        assert_eq!(done.outcome(), CompileOutcome::Succeeded);
        let failed = normalize_compile_status(&json!({"compile": {"state": "failed"}})).unwrap();
        assert_eq!(failed.outcome(), CompileOutcome::Failed);
        let queued = normalize_compile_status(&json!({"state": "InQueue"})).unwrap();
        assert_eq!(queued.outcome(), CompileOutcome::Pending);
    }
}
