//! Panel 3 (Help): keyboard shortcuts and recent errors.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::app::AppState;
use crate::theme;

pub fn render(f: &mut Frame, area: Rect, app: &AppState) {
    let mut lines: Vec<Line> = Vec::new();

    section(&mut lines, "Global");
    key(&mut lines, "1-3 / Tab", "Switch panel");
    key(&mut lines, "r", "Refresh: poll the backend now");
    key(&mut lines, "R", "Retry the last job from scratch");
    key(&mut lines, "x", "Cancel the running job");
    key(&mut lines, "q / Ctrl+C", "Quit");
    lines.push(Line::from(""));

    section(&mut lines, "Panel 1 - Job");
    key(&mut lines, "j / k", "Move between form fields");
    key(&mut lines, "Enter", "Edit field (Enter/Esc to finish)");
    key(&mut lines, "s", "Submit the job");
    lines.push(Line::from(""));

    section(&mut lines, "Panel 2 - Results");
    key(&mut lines, "j / k", "Scroll");
    key(&mut lines, "g", "Back to top");
    lines.push(Line::from(""));

    section(&mut lines, "Recent errors");
    if app.error_history.is_empty() {
        lines.push(Line::from(Span::styled("  none", theme::muted())));
    }
    for err in app.error_history.iter().take(5) {
        lines.push(Line::from(vec![
            Span::styled(format!("  [{}] ", err.timestamp.format("%H:%M:%S")), theme::muted()),
            Span::styled(err.message.as_str(), theme::negative()),
        ]));
    }

    f.render_widget(Paragraph::new(lines), area);
}

fn section<'a>(lines: &mut Vec<Line<'a>>, title: &str) {
    lines.push(Line::from(Span::styled(title.to_string(), theme::accent_bold())));
}

fn key<'a>(lines: &mut Vec<Line<'a>>, keys: &str, desc: &str) {
    lines.push(Line::from(vec![
        Span::styled(format!("  {:>14}  ", keys), theme::accent()),
        Span::styled(desc.to_string(), theme::muted()),
    ]));
}
