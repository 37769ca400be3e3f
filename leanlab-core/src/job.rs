//! Job requests and remote identifiers.
//!
//! A `JobSpec` is what the user finalizes before pressing "run". A `JobHandle`
//! is what the backend hands back: the project id is known immediately, the
//! compile and backtest ids fill in as each remote phase begins.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

/// Everything needed to create, compile, and backtest one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Lean algorithm source.
    pub code: String,
    /// Strategy / project name.
    pub name: String,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    /// Backend strategy record, if the strategy was saved before submission.
    #[serde(default)]
    pub strategy_id: Option<i64>,
}

impl JobSpec {
    /// Reject specs the backend would only fail on later.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.code.trim().is_empty() {
            return Err(SubmissionError::Invalid("algorithm code is empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(SubmissionError::Invalid("strategy name is empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(SubmissionError::Invalid("symbol is empty".into()));
        }
        if self.end_date <= self.start_date {
            return Err(SubmissionError::Invalid(format!(
                "end date {} must be after start date {}",
                self.end_date, self.start_date
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(SubmissionError::Invalid(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        Ok(())
    }
}

/// Identifier issued by the remote service. The backend returns these as
/// either JSON numbers or strings depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Int(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

impl RemoteId {
    /// Read an id typed by a user: digits become `Int`, anything else `Text`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse::<i64>()
            .map(RemoteId::Int)
            .unwrap_or_else(|_| RemoteId::Text(raw.to_string()))
    }
}

impl From<i64> for RemoteId {
    fn from(n: i64) -> Self {
        RemoteId::Int(n)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId::Text(s.to_string())
    }
}

/// Identifiers of one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub project_id: RemoteId,
    pub compile_id: Option<RemoteId>,
    pub backtest_id: Option<RemoteId>,
}

impl JobHandle {
    pub fn new(project_id: impl Into<RemoteId>) -> Self {
        Self {
            project_id: project_id.into(),
            compile_id: None,
            backtest_id: None,
        }
    }

    pub fn with_compile(mut self, compile_id: impl Into<RemoteId>) -> Self {
        self.compile_id = Some(compile_id.into());
        self
    }

    pub fn with_backtest(mut self, backtest_id: impl Into<RemoteId>) -> Self {
        self.backtest_id = Some(backtest_id.into());
        self
    }

    /// A handle is trackable once either remote phase has an id.
    pub fn is_trackable(&self) -> bool {
        self.compile_id.is_some() || self.backtest_id.is_some()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project {}", self.project_id)?;
        if let Some(id) = &self.compile_id {
            write!(f, " / compile {id}")?;
        }
        if let Some(id) = &self.backtest_id {
            write!(f, " / backtest {id}")?;
        }
        Ok(())
    }
}

/// Handle shared between the orchestrator (sole writer) and the poller (reader).
pub type SharedHandle = Arc<RwLock<JobHandle>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            code: "class Algo(QCAlgorithm): pass".into(),
            name: "sma cross".into(),
            symbol: "SPY".into(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            initial_capital: 100_000.0,
            strategy_id: None,
        }
    }

    #[test]
    fn remote_id_parse() {
        assert_eq!(RemoteId::parse(" 42 "), RemoteId::Int(42));
        assert_eq!(RemoteId::parse("bt-9f"), RemoteId::Text("bt-9f".into()));
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn inverted_dates_rejected() {
        let mut s = spec();
        s.end_date = s.start_date;
        assert!(matches!(s.validate(), Err(SubmissionError::Invalid(_))));
    }

    #[test]
    fn non_positive_capital_rejected() {
        let mut s = spec();
        s.initial_capital = 0.0;
        assert!(s.validate().is_err());
        s.initial_capital = f64::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn blank_code_rejected() {
        let mut s = spec();
        s.code = "   ".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn remote_id_accepts_numbers_and_strings() {
        let n: RemoteId = serde_json::from_str("42").unwrap();
        let s: RemoteId = serde_json::from_str("\"bt-9f\"").unwrap();
        assert_eq!(n, RemoteId::Int(42));
        assert_eq!(s.to_string(), "bt-9f");
    }

    #[test]
    fn handle_display_lists_known_ids() {
        let h = JobHandle::new(1).with_backtest(9);
        assert_eq!(h.to_string(), "project 1 / backtest 9");
        assert!(h.is_trackable());
        assert!(!JobHandle::new(1).is_trackable());
    }
}
