//! LeanLab CLI: submit backtest jobs to the remote service and watch them run.
//!
//! Commands:
//! - `run`: submit algorithm code, stream progress, save the results
//! - `status`: one-shot status query for an existing job
//! - `results`: fetch the results payload of a finished backtest
//! - `config`: print the effective configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use leanlab_core::status::{backtest_overall_progress, BacktestOutcome, CompileOutcome};
use leanlab_core::{HttpJobService, JobHandle, JobService, JobSpec, RemoteId, SystemClock};
use leanlab_runner::report::percent;
use leanlab_runner::{Orchestrator, OrchestratorEvent, RunnerConfig, StatusView};

#[derive(Parser)]
#[command(
    name = "leanlab",
    about = "LeanLab CLI - run backtests on the remote execution service"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a backtest and follow it to completion.
    Run {
        /// File containing the algorithm source.
        #[arg(long)]
        code: PathBuf,

        /// Strategy name shown by the backend.
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "SPY")]
        symbol: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        #[arg(long, default_value_t = 100_000.0)]
        capital: f64,

        /// Existing strategy record to attach the run to.
        #[arg(long)]
        strategy_id: Option<i64>,

        /// Write the results JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Query the current status of a submitted job once.
    Status {
        #[arg(long)]
        project_id: String,

        #[arg(long)]
        compile_id: Option<String>,

        #[arg(long)]
        backtest_id: Option<String>,
    },
    /// Fetch the results of a finished backtest.
    Results {
        #[arg(long)]
        project_id: String,

        #[arg(long)]
        backtest_id: String,

        /// Write the results JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration.
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunnerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            code,
            name,
            symbol,
            start,
            end,
            capital,
            strategy_id,
            output,
        } => {
            let spec = build_spec(&code, name, symbol, &start, &end, capital, strategy_id)?;
            run_job(&config, spec, output.as_deref())
        }
        Commands::Status {
            project_id,
            compile_id,
            backtest_id,
        } => {
            let handle = build_handle(&project_id, compile_id.as_deref(), backtest_id.as_deref())?;
            run_status(&config, &handle)
        }
        Commands::Results {
            project_id,
            backtest_id,
            output,
        } => {
            let handle = build_handle(&project_id, None, Some(&backtest_id))?;
            run_results(&config, &handle, output.as_deref())
        }
        Commands::Config => run_config(&config),
    }
}

fn service(config: &RunnerConfig) -> Result<HttpJobService> {
    HttpJobService::new(config.session(), config.request_timeout())
        .context("failed to build HTTP client")
}

fn build_spec(
    code_path: &Path,
    name: String,
    symbol: String,
    start: &str,
    end: &str,
    initial_capital: f64,
    strategy_id: Option<i64>,
) -> Result<JobSpec> {
    let code = std::fs::read_to_string(code_path)
        .with_context(|| format!("cannot read algorithm file {}", code_path.display()))?;
    let spec = JobSpec {
        code,
        name,
        symbol: symbol.to_uppercase(),
        start_date: parse_date("--start", start)?,
        end_date: parse_date("--end", end)?,
        initial_capital,
        strategy_id,
    };
    spec.validate()?;
    Ok(spec)
}

fn parse_date(flag: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("{flag}: expected YYYY-MM-DD, got '{raw}'"))
}

fn build_handle(project: &str, compile: Option<&str>, backtest: Option<&str>) -> Result<JobHandle> {
    let mut handle = JobHandle::new(RemoteId::parse(project));
    handle.compile_id = compile.map(RemoteId::parse);
    handle.backtest_id = backtest.map(RemoteId::parse);
    if !handle.is_trackable() {
        bail!("pass --compile-id or --backtest-id");
    }
    Ok(handle)
}

fn run_job(config: &RunnerConfig, spec: JobSpec, output: Option<&Path>) -> Result<()> {
    let service = service(config)?;
    let mut orchestrator = Orchestrator::new(
        Arc::new(service),
        Arc::new(SystemClock::new()),
        config.orchestrator_config(),
    );

    let handle = orchestrator.run(spec)?;
    println!("Submitted: {handle}");
    println!("{}", StatusView::from(orchestrator.status()).line());

    let mut results: Option<Value> = None;
    loop {
        for event in orchestrator.wait(Duration::from_secs(1)) {
            match event {
                OrchestratorEvent::Status(status) => {
                    let view = StatusView::from(&status);
                    println!("{} {}", view.bar(30), view.line());
                }
                OrchestratorEvent::Failed(msg) => bail!("job failed: {msg}"),
                OrchestratorEvent::ResultsReady(value) => results = Some(value),
                OrchestratorEvent::Navigate => {
                    return finish(results.as_ref(), output);
                }
            }
        }
        debug!(phase = ?orchestrator.status().phase, "waiting");
    }
}

fn finish(results: Option<&Value>, output: Option<&Path>) -> Result<()> {
    match results {
        Some(value) => write_results(value, output),
        None => {
            warn!("backtest completed but results could not be fetched");
            println!("Backtest completed; fetch results later with `leanlab results`.");
            Ok(())
        }
    }
}

fn write_results(value: &Value, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, json)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Results saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_status(config: &RunnerConfig, handle: &JobHandle) -> Result<()> {
    let service = service(config)?;
    println!("Job: {handle}");

    if handle.backtest_id.is_some() {
        let progress = service.backtest_status(handle)?;
        let summary = match progress.outcome() {
            BacktestOutcome::Completed => "completed (100%)".to_string(),
            BacktestOutcome::Failed => "failed".to_string(),
            BacktestOutcome::Running { progress } => {
                format!("running ({})", percent(backtest_overall_progress(progress)))
            }
        };
        println!("Backtest: {} [{}]", summary, progress.raw_status);
    } else {
        let progress = service.compile_status(handle)?;
        let summary = match progress.outcome() {
            CompileOutcome::Succeeded => "succeeded",
            CompileOutcome::Failed => "failed",
            CompileOutcome::Pending => "pending",
        };
        println!("Compilation: {} [{}]", summary, progress.raw_state);
    }
    Ok(())
}

fn run_results(config: &RunnerConfig, handle: &JobHandle, output: Option<&Path>) -> Result<()> {
    let service = service(config)?;
    let value = service.fetch_results(handle)?;
    write_results(&value, output)
}

fn run_config(config: &RunnerConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    let token = if config.session().token().is_some() {
        "set"
    } else {
        "not set"
    };
    println!("\n# ${} is {token}", config.backend.token_env);
    Ok(())
}
