//! Top-level UI layout: tab strip, active panel, status bar.

pub mod help_panel;
pub mod job_panel;
pub mod results_panel;
pub mod status_bar;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{AppState, Panel};
use crate::theme;

/// Draw the entire UI.
pub fn draw(f: &mut Frame, app: &AppState) {
    // Split: 1-line tab strip + main area + 1-line status bar.
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_tabs(f, chunks[0], app);
    draw_panel(f, chunks[1], app);
    status_bar::render(f, chunks[2], app);
}

fn draw_tabs(f: &mut Frame, area: Rect, app: &AppState) {
    let mut spans = vec![Span::styled(" LeanLab ", theme::accent_bold())];
    for i in 0..Panel::COUNT {
        let Some(panel) = Panel::from_index(i) else {
            continue;
        };
        let style = if panel == app.active_panel {
            theme::accent_bold()
        } else {
            theme::muted()
        };
        spans.push(Span::styled(format!(" {}:{} ", i + 1, panel.label()), style));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_panel(f: &mut Frame, area: Rect, app: &AppState) {
    let panel = app.active_panel;

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::panel_border(true))
        .title(format!(" {} [{}] ", panel.label(), panel.index() + 1))
        .title_style(theme::panel_title(true));

    let inner = block.inner(area);
    f.render_widget(block, area);

    match panel {
        Panel::Job => job_panel::render(f, inner, app),
        Panel::Results => results_panel::render(f, inner, app),
        Panel::Help => help_panel::render(f, inner, app),
    }
}
