//! LeanLab Runner: polling, orchestration, and configuration for backtest jobs.
//!
//! - `poller`: phase state machine and the per-job poll thread
//! - `orchestrator`: submit then poll then results then navigate lifecycle
//! - `report`: status reporter view model shared by the CLI and TUI
//! - `config`: TOML configuration

pub mod config;
pub mod orchestrator;
pub mod poller;
pub mod report;

pub use config::{ConfigError, RunnerConfig};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorEvent, RunError};
pub use poller::{JobObserver, JobTracker, Poller, PollerConfig, PollerHandle, Step};
pub use report::StatusView;
