//! TOML runner configuration: backend location and polling timings.
//!
//! Every key is optional; an empty file yields the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use leanlab_core::session::SessionContext;

use crate::orchestrator::OrchestratorConfig;
use crate::poller::PollerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            token_env: "LEANLAB_TOKEN".into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub compile_interval_ms: u64,
    pub backtest_interval_ms: u64,
    pub timeout_ms: u64,
    pub navigate_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            compile_interval_ms: 2000,
            backtest_interval_ms: 5000,
            timeout_ms: 600_000,
            navigate_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
}

impl RunnerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".into()));
        }
        let p = &self.polling;
        for (name, value) in [
            ("polling.compile_interval_ms", p.compile_interval_ms),
            ("polling.backtest_interval_ms", p.backtest_interval_ms),
            ("polling.timeout_ms", p.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            compile_interval: Duration::from_millis(self.polling.compile_interval_ms),
            backtest_interval: Duration::from_millis(self.polling.backtest_interval_ms),
            timeout: Duration::from_millis(self.polling.timeout_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poller: self.poller_config(),
            navigate_delay: Duration::from_millis(self.polling.navigate_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Session for this run, with the token read from `backend.token_env`.
    pub fn session(&self) -> SessionContext {
        let token = std::env::var(&self.backend.token_env).ok();
        SessionContext::new(&self.backend.base_url, token)
    }
}
