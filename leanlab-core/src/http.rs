//! Backend HTTP client.
//!
//! Talks to the Django backend that proxies the cloud execution service.
//! One attempt per call: retrying is the caller's decision, and the poller
//! deliberately fails fast.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PollingError, SubmissionError};
use crate::job::{JobHandle, JobSpec, RemoteId};
use crate::service::JobService;
use crate::session::SessionContext;
use crate::status::{self, BacktestProgress, CompileProgress};

const RUN_BACKTEST_PATH: &str = "/api/quantconnect/run-backtest/";
const LAUNCH_BACKTEST_PATH: &str = "/api/quantconnect/launch-backtest/";
const COMPILE_STATUS_PATH: &str = "/api/quantconnect/compile-status/";
const BACKTEST_PROGRESS_PATH: &str = "/api/quantconnect/backtest-progress/";
const BACKTEST_RESULTS_PATH: &str = "/api/quantconnect/backtest-results/";

#[derive(Debug, Serialize)]
struct RunBacktestRequest<'a> {
    strategy: StrategyBody<'a>,
    backtest_params: BacktestParams,
}

#[derive(Debug, Serialize)]
struct StrategyBody<'a> {
    id: Option<i64>,
    name: &'a str,
    lean_code: &'a str,
}

#[derive(Debug, Serialize)]
struct BacktestParams {
    start_date: NaiveDate,
    end_date: NaiveDate,
    initial_capital: f64,
}

#[derive(Debug, Deserialize)]
struct RunBacktestResponse {
    #[serde(default = "default_true")]
    success: bool,
    quantconnect: Option<RemoteIds>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteIds {
    project_id: RemoteId,
    compile_id: Option<RemoteId>,
    backtest_id: Option<RemoteId>,
}

#[derive(Debug, Serialize)]
struct LaunchBacktestRequest<'a> {
    project_id: &'a RemoteId,
    compile_id: &'a RemoteId,
}

#[derive(Debug, Deserialize)]
struct LaunchBacktestResponse {
    #[serde(default = "default_true")]
    success: bool,
    backtest_id: Option<RemoteId>,
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// `JobService` over the backend's REST API.
pub struct HttpJobService {
    client: Client,
    session: SessionContext,
}

impl HttpJobService {
    pub fn new(session: SessionContext, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, session })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<Response, SubmissionError> {
        let url = self.session.endpoint(path);
        debug!(%url, "POST");
        let resp = self
            .authorized(self.client.post(&url).json(body))
            .send()
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SubmissionError::Http {
                status: status.as_u16(),
                message: error_message(&body, status.canonical_reason()),
            });
        }
        Ok(resp)
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, PollingError> {
        let url = self.session.endpoint(path);
        debug!(%url, ?query, "GET");
        let resp = self
            .authorized(self.client.get(&url).query(query))
            .send()
            .map_err(|e| PollingError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(PollingError::Http {
                status: status.as_u16(),
                message: error_message(&body, status.canonical_reason()),
            });
        }

        resp.json::<Value>().map_err(|e| {
            if e.is_decode() {
                PollingError::Malformed(e.to_string())
            } else {
                PollingError::Network(e.to_string())
            }
        })
    }

    fn backtest_query(handle: &JobHandle) -> Result<Vec<(&'static str, String)>, PollingError> {
        let backtest_id = handle
            .backtest_id
            .as_ref()
            .ok_or(PollingError::MissingId("backtest"))?;
        Ok(vec![
            ("project_id", handle.project_id.to_string()),
            ("backtest_id", backtest_id.to_string()),
        ])
    }
}

impl JobService for HttpJobService {
    fn submit(&self, spec: &JobSpec) -> Result<JobHandle, SubmissionError> {
        spec.validate()?;

        let body = RunBacktestRequest {
            strategy: StrategyBody {
                id: spec.strategy_id,
                name: &spec.name,
                lean_code: &spec.code,
            },
            backtest_params: BacktestParams {
                start_date: spec.start_date,
                end_date: spec.end_date,
                initial_capital: spec.initial_capital,
            },
        };

        let resp: RunBacktestResponse = self
            .post_json(RUN_BACKTEST_PATH, &body)?
            .json()
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))?;

        let handle = submit_response_to_handle(resp)?;
        info!(name = %spec.name, symbol = %spec.symbol, %handle, "job submitted");
        Ok(handle)
    }

    fn launch_backtest(&self, handle: &JobHandle) -> Result<RemoteId, SubmissionError> {
        let compile_id = handle
            .compile_id
            .as_ref()
            .ok_or_else(|| SubmissionError::Invalid("job handle has no compile id".into()))?;

        let body = LaunchBacktestRequest {
            project_id: &handle.project_id,
            compile_id,
        };
        let resp: LaunchBacktestResponse = self
            .post_json(LAUNCH_BACKTEST_PATH, &body)?
            .json()
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))?;

        if !resp.success {
            return Err(SubmissionError::Rejected(
                resp.error.unwrap_or_else(|| "backtest launch refused".into()),
            ));
        }
        let id = resp
            .backtest_id
            .ok_or_else(|| SubmissionError::MalformedResponse("no backtest_id in response".into()))?;
        info!(project = %handle.project_id, backtest = %id, "backtest launched");
        Ok(id)
    }

    fn compile_status(&self, handle: &JobHandle) -> Result<CompileProgress, PollingError> {
        let compile_id = handle
            .compile_id
            .as_ref()
            .ok_or(PollingError::MissingId("compile"))?;
        let query = [
            ("project_id", handle.project_id.to_string()),
            ("compile_id", compile_id.to_string()),
        ];
        let body = self.get_json(COMPILE_STATUS_PATH, &query)?;
        status::normalize_compile_status(&body)
    }

    fn backtest_status(&self, handle: &JobHandle) -> Result<BacktestProgress, PollingError> {
        let query = Self::backtest_query(handle)?;
        let body = self.get_json(BACKTEST_PROGRESS_PATH, &query)?;
        status::normalize_backtest_status(&body)
    }

    fn fetch_results(&self, handle: &JobHandle) -> Result<Value, PollingError> {
        let query = Self::backtest_query(handle)?;
        self.get_json(BACKTEST_RESULTS_PATH, &query)
    }
}

fn submit_response_to_handle(resp: RunBacktestResponse) -> Result<JobHandle, SubmissionError> {
    if !resp.success {
        return Err(SubmissionError::Rejected(
            resp.error.unwrap_or_else(|| "job submission refused".into()),
        ));
    }
    let ids = resp
        .quantconnect
        .ok_or_else(|| SubmissionError::MalformedResponse("no quantconnect ids in response".into()))?;

    let handle = JobHandle {
        project_id: ids.project_id,
        compile_id: ids.compile_id,
        backtest_id: ids.backtest_id,
    };
    if !handle.is_trackable() {
        return Err(SubmissionError::MalformedResponse(
            "response carries neither a compile id nor a backtest id".into(),
        ));
    }
    Ok(handle)
}

/// Best human-readable message from an error body.
fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return reason.unwrap_or("no message").to_string();
    }
    trimmed.chars().take(200).collect()
}
