//! The seam between job tracking and the backend.
//!
//! Poller and orchestrator only ever see this trait, so tests drive them with
//! scripted responses instead of a live backend.

use serde_json::Value;

use crate::error::{PollingError, SubmissionError};
use crate::job::{JobHandle, JobSpec, RemoteId};
use crate::status::{BacktestProgress, CompileProgress};

pub trait JobService: Send + Sync {
    /// Create the project, compile, and start the backtest in one call.
    fn submit(&self, spec: &JobSpec) -> Result<JobHandle, SubmissionError>;

    /// Start a backtest for a project whose compilation has finished.
    fn launch_backtest(&self, handle: &JobHandle) -> Result<RemoteId, SubmissionError>;

    fn compile_status(&self, handle: &JobHandle) -> Result<CompileProgress, PollingError>;

    fn backtest_status(&self, handle: &JobHandle) -> Result<BacktestProgress, PollingError>;

    /// Final statistics and charts of a completed backtest.
    fn fetch_results(&self, handle: &JobHandle) -> Result<Value, PollingError>;
}
