//! Per-job progress spinners.
//!
//! Each generation job gets its own spinner, fed only from the poll loop's
//! progress callback. Several spinners can share one `MultiProgress` when
//! jobs run concurrently.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;

use super::colors::Theme;
use crate::client::JobProgress;

/// Braille spinner frames.
pub const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Spinner line text for a progress snapshot.
pub fn progress_message(label: &str, progress: &JobProgress) -> String {
    format!(
        "{}: {} (check {}, {:.1}s)",
        label,
        progress.status,
        progress.attempt,
        progress.elapsed.as_secs_f64()
    )
}

#[derive(Debug, Clone)]
pub struct JobSpinner {
    bar: ProgressBar,
    label: String,
    theme: Theme,
}

impl JobSpinner {
    /// Creates a visible spinner, attached to `multi` when given.
    pub fn new(multi: Option<&MultiProgress>, label: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        let bar = match multi {
            Some(multi) => multi.add(bar),
            None => bar,
        };
        Self::configure(bar, label.into())
    }

    /// Creates a spinner that never draws, for quiet or non-terminal runs.
    pub fn hidden(label: impl Into<String>) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
        Self::configure(bar, label.into())
    }

    fn configure(bar: ProgressBar, label: String) -> Self {
        let theme = Theme::default();
        let blue = theme.in_progress;
        let mut ticks = FRAMES.to_vec();
        ticks.push("✓");
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.color({},{},{})}} [{{elapsed_precise}}] {{msg}}",
            blue.0, blue.1, blue.2
        ))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&ticks);

        bar.set_style(style);
        bar.set_message(format!("{}: submitting", label));
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar, label, theme }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Shows the latest poll snapshot.
    pub fn update(&self, progress: &JobProgress) {
        self.bar.set_message(progress_message(&self.label, progress));
    }

    pub fn finish_with_success(&self, message: impl Into<String>) {
        let styled = format!("{} {}: {}", "✓".color(self.theme.success), self.label, message.into());
        self.bar.finish_with_message(styled);
    }

    pub fn finish_with_error(&self, message: impl Into<String>) {
        let styled = format!("{} {}: {}", "✗".color(self.theme.error), self.label, message.into());
        self.bar.finish_with_message(styled);
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::JobStatus;

    #[test]
    fn test_progress_message() {
        let progress = JobProgress {
            job_id: "job-1".to_string(),
            status: JobStatus::Processing,
            attempt: 3,
            elapsed: Duration::from_millis(4200),
        };
        assert_eq!(
            progress_message("src/calc.py", &progress),
            "src/calc.py: processing (check 3, 4.2s)"
        );
    }

    #[test]
    fn test_hidden_spinner_accepts_updates() {
        let spinner = JobSpinner::hidden("calc");
        spinner.update(&JobProgress {
            job_id: "job-1".to_string(),
            status: JobStatus::Pending,
            attempt: 1,
            elapsed: Duration::ZERO,
        });
        spinner.finish_with_success("done");
        assert_eq!(spinner.label(), "calc");
    }
}
