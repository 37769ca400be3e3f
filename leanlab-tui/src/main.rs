//! LeanLab TUI: submit a backtest job and watch it run.
//!
//! Panels:
//! 1. Job: submission form, progress gauge, status line, error banner
//! 2. Results: final backtest payload
//! 3. Help: keyboard shortcuts and recent errors

mod app;
mod input;
mod persistence;
mod theme;
mod ui;
mod worker;

use std::fs::OpenOptions;
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leanlab_core::{HttpJobService, SystemClock};
use leanlab_runner::{Orchestrator, RunnerConfig};

use crate::app::AppState;
use crate::worker::WorkerCommand;

fn main() -> Result<()> {
    // Install a panic hook that restores the terminal before printing the panic.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stderr(), LeaveAlternateScreen);
        default_hook(info);
    }));

    // Paths
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leanlab");
    let state_path = config_dir.join("state.json");

    init_logging(&config_dir.join("leanlab.log"))?;

    let config_path = std::env::var_os("LEANLAB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = if config_path.exists() {
        RunnerConfig::from_file(&config_path)?
    } else {
        RunnerConfig::default()
    };
    info!(base_url = %config.backend.base_url, "starting leanlab tui");

    // Orchestrator lives on the worker thread.
    let service = HttpJobService::new(config.session(), config.request_timeout())
        .context("failed to build HTTP client")?;
    let orchestrator = Orchestrator::new(
        Arc::new(service),
        Arc::new(SystemClock::new()),
        config.orchestrator_config(),
    );

    // Worker channels
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (resp_tx, resp_rx) = mpsc::channel();
    let worker_handle = worker::spawn_worker(orchestrator, cmd_rx, resp_tx)
        .context("failed to spawn worker thread")?;

    // Build app state and apply persisted form
    let mut app = AppState::new(cmd_tx.clone(), resp_rx, state_path.clone());
    persistence::apply(&mut app, persistence::load(&state_path));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app);

    // Save state before exit
    if let Err(e) = persistence::save(&app.state_path, &persistence::extract(&app)) {
        tracing::warn!(error = %e, "could not save form state");
    }

    // Shutdown worker
    let _ = cmd_tx.send(WorkerCommand::Shutdown);
    let _ = worker_handle.join();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Log to a file; stdout belongs to the terminal UI.
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
) -> Result<()> {
    loop {
        // 1. Render
        terminal.draw(|f| ui::draw(f, app))?;

        // 2. Drain worker responses (non-blocking)
        while let Ok(resp) = app.worker_rx.try_recv() {
            app.apply_response(resp);
        }

        // 3. Poll for input events (50ms timeout for ~20 FPS tick)
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                input::handle_key(app, key);
            }
        }

        // 4. Check quit
        if !app.running {
            break;
        }
    }
    Ok(())
}
