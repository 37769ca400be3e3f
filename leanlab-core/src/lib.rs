//! LeanLab Core: job model, status normalization, and backend access.
//!
//! - Job requests and remote identifiers (`job`)
//! - Phase enum and the normalized `JobStatus` (`status`)
//! - Error taxonomy for submission and polling (`error`)
//! - The `JobService` seam and its HTTP implementation (`service`, `http`)
//! - Explicit session context and a pluggable clock (`session`, `clock`)

pub mod clock;
pub mod error;
pub mod http;
pub mod job;
pub mod service;
pub mod session;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{JobError, PollingError, SubmissionError};
pub use http::HttpJobService;
pub use job::{JobHandle, JobSpec, RemoteId, SharedHandle};
pub use service::JobService;
pub use session::SessionContext;
pub use status::{
    BacktestOutcome, BacktestProgress, CompileOutcome, CompileProgress, JobStatus, Phase,
};
