//! Keyboard input dispatch: form editing then global keys then panel-specific handlers.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::{AppState, Panel};

pub fn handle_key(app: &mut AppState, key: KeyEvent) {
    // Only handle key press events (Windows sends both Press and Release).
    if key.kind != KeyEventKind::Press {
        return;
    }

    // 1. An open form field consumes all input.
    if app.form.editing {
        handle_editing(app, key);
        return;
    }

    // 2. Global keys.
    match key.code {
        KeyCode::Char('q') => {
            app.running = false;
            return;
        }
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.running = false;
            return;
        }
        KeyCode::Char('1') => {
            app.active_panel = Panel::Job;
            return;
        }
        KeyCode::Char('2') => {
            app.active_panel = Panel::Results;
            return;
        }
        KeyCode::Char('3') | KeyCode::Char('?') => {
            app.active_panel = Panel::Help;
            return;
        }
        KeyCode::Tab => {
            app.active_panel = app.active_panel.next();
            return;
        }
        KeyCode::BackTab => {
            app.active_panel = app.active_panel.prev();
            return;
        }
        KeyCode::Char('r') => {
            app.refresh();
            return;
        }
        KeyCode::Char('R') => {
            app.retry();
            return;
        }
        KeyCode::Char('x') => {
            app.cancel();
            return;
        }
        _ => {}
    }

    // 3. Panel-specific keys.
    match app.active_panel {
        Panel::Job => handle_job_key(app, key),
        Panel::Results => handle_results_key(app, key),
        Panel::Help => {}
    }
}

fn handle_editing(app: &mut AppState, key: KeyEvent) {
    match key.code {
        KeyCode::Enter | KeyCode::Esc | KeyCode::Tab => {
            app.form.editing = false;
        }
        KeyCode::Backspace => {
            let field = app.form.active_field();
            app.form.value_mut(field).pop();
        }
        KeyCode::Char(c) => {
            let field = app.form.active_field();
            app.form.value_mut(field).push(c);
        }
        _ => {}
    }
}

fn handle_job_key(app: &mut AppState, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.form.move_down(),
        KeyCode::Char('k') | KeyCode::Up => app.form.move_up(),
        KeyCode::Enter | KeyCode::Char('e') => {
            if app.is_job_running() {
                app.set_warning("Cancel the running job (x) before editing");
            } else {
                app.form.editing = true;
            }
        }
        KeyCode::Char('s') => {
            if app.is_job_running() {
                app.set_warning("A job is already running");
            } else {
                app.submit();
            }
        }
        KeyCode::Esc => app.cancel(),
        _ => {}
    }
}

fn handle_results_key(app: &mut AppState, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            app.results.scroll = app.results.scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.results.scroll = app.results.scroll.saturating_sub(1);
        }
        KeyCode::Char('g') | KeyCode::Home => app.results.scroll = 0,
        _ => {}
    }
}
