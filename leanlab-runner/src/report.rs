//! Status reporter view model: `JobStatus` in, display text out.

use leanlab_core::status::{JobStatus, Phase};

/// What a progress display needs: bar fill, phase label, detail line, banner.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    /// Bar fill, 0.0–1.0.
    pub ratio: f64,
    pub label: String,
    pub detail: String,
    /// Present only in the `Error` phase.
    pub banner: Option<String>,
}

impl From<&JobStatus> for StatusView {
    fn from(status: &JobStatus) -> Self {
        let ratio = (status.progress / 100.0).clamp(0.0, 1.0);
        let label = status.phase.label().to_string();

        let detail = if status.raw_state.is_empty() {
            percent(status.progress)
        } else {
            format!("{} · {}", percent(status.progress), status.raw_state)
        };

        let banner = (status.phase == Phase::Error).then(|| {
            status
                .error_message
                .clone()
                .unwrap_or_else(|| "job failed".to_string())
        });

        Self {
            ratio,
            label,
            detail,
            banner,
        }
    }
}

/// Whole-percent label. Truncates, so a running job never reads "100%".
pub fn percent(progress: f64) -> String {
    format!("{:.0}%", progress.floor())
}

impl StatusView {
    /// One-line rendering for logs and the CLI.
    pub fn line(&self) -> String {
        match &self.banner {
            Some(msg) => format!("[{}] {} - {}", self.label, self.detail, msg),
            None => format!("[{}] {}", self.label, self.detail),
        }
    }

    /// Text progress bar of `width` cells.
    pub fn bar(&self, width: usize) -> String {
        let filled = (self.ratio * width as f64).round() as usize;
        let filled = filled.min(width);
        format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_status_view() {
        let status = JobStatus::entering(Phase::BacktestWaiting).advance(
            Phase::BacktestWaiting,
            "Running",
            70.0,
        );
        let view = StatusView::from(&status);
        assert!((view.ratio - 0.7).abs() < 1e-9);
        assert_eq!(view.label, "Running backtest");
        assert_eq!(view.detail, "70% · Running");
        assert!(view.banner.is_none());
        assert_eq!(view.bar(10), "[#######---]");
    }

    #[test]
    fn near_complete_backtest_does_not_read_as_done() {
        let status = JobStatus::entering(Phase::BacktestWaiting).advance(
            Phase::BacktestWaiting,
            "Running",
            99.5,
        );
        assert_eq!(StatusView::from(&status).detail, "99% · Running");
        assert_eq!(percent(100.0), "100%");
    }

    #[test]
    fn error_status_has_banner() {
        let status = JobStatus::entering(Phase::CompilationWaiting).fail("Compilation failed");
        let view = StatusView::from(&status);
        assert_eq!(view.banner.as_deref(), Some("Compilation failed"));
        assert!(view.line().contains("Compilation failed"));
    }

    #[test]
    fn idle_view_is_empty_bar() {
        let view = StatusView::from(&JobStatus::idle());
        assert_eq!(view.ratio, 0.0);
        assert_eq!(view.bar(4), "[----]");
        assert_eq!(view.line(), "[Idle] 0%");
    }
}
