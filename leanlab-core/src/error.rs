//! Structured error types for job submission and tracking.
//!
//! These are designed to be displayable in both CLI and TUI contexts.
//! Every kind is terminal for the job it belongs to; recovery means
//! resubmitting from scratch.

use std::time::Duration;

use thiserror::Error;

/// The remote job could not be created or started.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("backend rejected the job: {0}")]
    Rejected(String),

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("response format changed: {0}")]
    MalformedResponse(String),

    #[error("invalid job: {0}")]
    Invalid(String),
}

impl SubmissionError {
    /// HTTP status of the failed call, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SubmissionError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A single status query failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollingError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("status query returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed status response: {0}")]
    Malformed(String),

    #[error("backend reported an error: {0}")]
    Rejected(String),

    #[error("job handle has no {0} id")]
    MissingId(&'static str),
}

/// Why a job ended in the `Error` phase.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("{0}")]
    Submission(#[from] SubmissionError),

    #[error("{0}")]
    Polling(#[from] PollingError),

    /// The remote service itself reported a compilation or execution failure.
    #[error("{0}")]
    RemoteFailure(String),

    #[error("timeout")]
    Timeout { elapsed: Duration },
}

impl JobError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobError::Timeout { .. })
    }
}
