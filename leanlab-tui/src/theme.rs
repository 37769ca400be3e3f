//! Parrot/neon theme tokens for the LeanLab TUI.
//!
//! # Color Palette
//! - **Accent**: Electric cyan (focus, highlights)
//! - **Positive**: Neon green (completed jobs)
//! - **Negative**: Hot pink (errors, the failure banner)
//! - **Warning**: Neon orange (cancellations, soft warnings)
//! - **Neutral**: Cool purple (secondary info)
//! - **Muted**: Steel blue (hints, disabled text)

use ratatui::style::{Color, Modifier, Style};

use leanlab_core::status::Phase;

pub const ACCENT: Color = Color::Rgb(0, 255, 255);
pub const POSITIVE: Color = Color::Rgb(0, 255, 128);
pub const NEGATIVE: Color = Color::Rgb(255, 20, 147);
pub const WARNING: Color = Color::Rgb(255, 140, 0);
pub const NEUTRAL: Color = Color::Rgb(147, 112, 219);
pub const MUTED: Color = Color::Rgb(100, 149, 237);
pub const ERROR_BG: Color = Color::Rgb(90, 0, 30);

pub fn accent() -> Style {
    Style::default().fg(ACCENT)
}

pub fn accent_bold() -> Style {
    accent().add_modifier(Modifier::BOLD)
}

pub fn positive() -> Style {
    Style::default().fg(POSITIVE)
}

pub fn negative() -> Style {
    Style::default().fg(NEGATIVE)
}

pub fn warning() -> Style {
    Style::default().fg(WARNING)
}

pub fn neutral() -> Style {
    Style::default().fg(NEUTRAL)
}

pub fn muted() -> Style {
    Style::default().fg(MUTED)
}

/// Red banner that replaces the progress gauge on failure.
pub fn error_banner() -> Style {
    Style::default()
        .fg(Color::White)
        .bg(ERROR_BG)
        .add_modifier(Modifier::BOLD)
}

pub fn panel_border(active: bool) -> Style {
    if active {
        accent()
    } else {
        muted()
    }
}

pub fn panel_title(active: bool) -> Style {
    if active {
        accent_bold()
    } else {
        muted()
    }
}

/// Gauge and label color for a job phase.
pub fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::Idle => MUTED,
        Phase::Completed => POSITIVE,
        Phase::Error => NEGATIVE,
        Phase::CreatingProject | Phase::Compiling | Phase::CompilationWaiting => NEUTRAL,
        Phase::RunningBacktest | Phase::BacktestWaiting => ACCENT,
    }
}

pub fn phase_style(phase: Phase) -> Style {
    Style::default().fg(phase_color(phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases_have_distinct_colors() {
        assert_eq!(phase_color(Phase::Completed), POSITIVE);
        assert_eq!(phase_color(Phase::Error), NEGATIVE);
        assert_ne!(phase_color(Phase::Completed), phase_color(Phase::Error));
    }

    #[test]
    fn active_border_is_accent() {
        assert_eq!(panel_border(true), accent());
        assert_eq!(panel_border(false), muted());
    }
}
