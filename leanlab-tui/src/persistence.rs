//! Form state persistence: JSON save/load across restarts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::{AppState, Panel};

/// Serializable subset of app state that persists across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub name: String,
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub capital: String,
    pub code_path: String,
    pub active_panel: Panel,
}

impl Default for PersistedState {
    fn default() -> Self {
        let form = crate::app::JobForm::default();
        Self {
            name: form.name,
            symbol: form.symbol,
            start_date: form.start_date,
            end_date: form.end_date,
            capital: form.capital,
            code_path: form.code_path,
            active_panel: Panel::Job,
        }
    }
}

/// Load persisted state from disk. Returns defaults if file is missing or corrupt.
pub fn load(path: &Path) -> PersistedState {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => PersistedState::default(),
    }
}

/// Save persisted state to disk. Creates parent directories if needed.
pub fn save(path: &Path, state: &PersistedState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn extract(app: &AppState) -> PersistedState {
    let form = &app.form;
    PersistedState {
        name: form.name.clone(),
        symbol: form.symbol.clone(),
        start_date: form.start_date.clone(),
        end_date: form.end_date.clone(),
        capital: form.capital.clone(),
        code_path: form.code_path.clone(),
        active_panel: app.active_panel,
    }
}

pub fn apply(app: &mut AppState, state: PersistedState) {
    let form = &mut app.form;
    form.name = state.name;
    form.symbol = state.symbol;
    form.start_date = state.start_date;
    form.end_date = state.end_date;
    form.capital = state.capital;
    form.code_path = state.code_path;
    // Results from a previous session are gone; start on the form.
    app.active_panel = match state.active_panel {
        Panel::Results => Panel::Job,
        other => other,
    };
}
