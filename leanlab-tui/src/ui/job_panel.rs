//! Panel 1 (Job): submission form, progress gauge, status line, error banner.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use leanlab_runner::StatusView;

use crate::app::{AppState, FormField};
use crate::theme;

pub fn render(f: &mut Frame, area: Rect, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(FormField::ALL.len() as u16 + 2),
            Constraint::Length(3),
            Constraint::Min(2),
        ])
        .split(area);

    render_form(f, chunks[0], app);
    render_progress(f, chunks[1], app);
    render_status(f, chunks[2], app);
}

fn render_form(f: &mut Frame, area: Rect, app: &AppState) {
    let form = &app.form;
    let mut lines: Vec<Line> = vec![Line::from(Span::styled(
        "[j/k]field [Enter]edit [s]ubmit [r]efresh [R]etry [x]cancel",
        theme::muted(),
    ))];
    lines.push(Line::from(""));

    for (i, field) in FormField::ALL.iter().enumerate() {
        let is_cursor = i == form.cursor;
        let value = form.value(*field);
        let value_style = match (is_cursor, form.editing) {
            (true, true) => theme::accent().add_modifier(Modifier::UNDERLINED),
            (true, false) => theme::accent().add_modifier(Modifier::REVERSED),
            _ => theme::neutral(),
        };
        let caret = if is_cursor && form.editing { "_" } else { "" };

        lines.push(Line::from(vec![
            Span::styled(format!("{:>16}: ", field.label()), theme::muted()),
            Span::styled(format!("{value}{caret}"), value_style),
        ]));
    }

    f.render_widget(Paragraph::new(lines), area);
}

fn render_progress(f: &mut Frame, area: Rect, app: &AppState) {
    let view = StatusView::from(&app.job.status);

    if let Some(banner) = &view.banner {
        let para = Paragraph::new(Line::from(Span::styled(format!(" {banner} "), theme::error_banner())))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme::negative())
                    .title(" Error ")
                    .title_style(theme::negative()),
            )
            .wrap(Wrap { trim: true });
        f.render_widget(para, area);
        return;
    }

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme::muted())
                .title(format!(" {} ", view.label)),
        )
        .gauge_style(theme::phase_style(app.job.status.phase))
        .ratio(view.ratio)
        .label(view.detail.clone());
    f.render_widget(gauge, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &AppState) {
    let status = &app.job.status;
    let mut lines = vec![Line::from(vec![
        Span::styled("Phase: ", theme::muted()),
        Span::styled(status.phase.label(), theme::phase_style(status.phase)),
    ])];

    if let Some(handle) = &app.job.handle {
        lines.push(Line::from(vec![
            Span::styled("Remote: ", theme::muted()),
            Span::styled(handle.to_string(), theme::neutral()),
        ]));
    }
    if !status.raw_state.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Backend state: ", theme::muted()),
            Span::styled(status.raw_state.as_str(), theme::neutral()),
        ]));
    }
    if status.is_terminal() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "[R] retry from scratch, [s] submit the edited form",
            theme::muted(),
        )));
    }

    f.render_widget(Paragraph::new(lines), area);
}
