//! Panel 2 (Results): flattened view of the final backtest payload.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use serde_json::Value;

use crate::app::AppState;
use crate::theme;

pub fn render(f: &mut Frame, area: Rect, app: &AppState) {
    let r = &app.results;
    let mut lines: Vec<Line> = Vec::new();

    let Some(results) = &r.results else {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "No results yet. Submit a job from Panel 1; results open here when it completes.",
            theme::muted(),
        )));
        f.render_widget(Paragraph::new(lines), area);
        return;
    };

    let rows = flatten(results);
    lines.push(Line::from(vec![
        Span::styled(format!("{} fields", rows.len()), theme::accent()),
        Span::styled("  [j/k]scroll [g]top", theme::muted()),
    ]));
    lines.push(Line::from(""));

    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0).min(40);
    let visible = area.height.saturating_sub(2) as usize;
    let start = r.scroll.min(rows.len().saturating_sub(1));
    for (key, value) in rows.iter().skip(start).take(visible) {
        lines.push(Line::from(vec![
            Span::styled(format!("{key:>key_width$}  "), theme::muted()),
            Span::styled(value.clone(), value_style(value)),
        ]));
    }

    f.render_widget(Paragraph::new(lines), area);
}

fn value_style(value: &str) -> ratatui::style::Style {
    if value.starts_with('-') {
        theme::negative()
    } else {
        theme::neutral()
    }
}

/// Flatten nested objects into dotted keys. Arrays are summarized by length.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_into(&key, v, out);
            }
        }
        Value::Array(items) => out.push((prefix.to_string(), format!("[{} items]", items.len()))),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Null => out.push((prefix.to_string(), "-".into())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_statistics() {
        let rows = flatten(&json!({
            "statistics": {"Sharpe Ratio": "1.1", "Total Trades": 42},
            "charts": [1, 2, 3],
        }));
        assert!(rows.contains(&("statistics.Sharpe Ratio".into(), "1.1".into())));
        assert!(rows.contains(&("statistics.Total Trades".into(), "42".into())));
        assert!(rows.contains(&("charts".into(), "[3 items]".into())));
    }

    #[test]
    fn scalar_root_has_empty_key() {
        assert_eq!(flatten(&json!(7)), vec![(String::new(), "7".into())]);
    }
}
