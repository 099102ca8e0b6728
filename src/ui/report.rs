//! Human-readable reports for the CLI.
//!
//! Every renderer returns a `String` so output can be tested without a
//! terminal.

use std::path::{Path, PathBuf};

use super::colors::Palette;
use crate::merge::{ConflictInfo, TestFileInfo};
use crate::pipeline::{CancelPoint, MergeStatus, PipelineOutcome, Preview};
use crate::validate::{Severity, ValidationReport};

fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

pub struct Report {
    palette: Palette,
    root: PathBuf,
}

impl Report {
    pub fn new(root: &Path, color: bool) -> Self {
        Self {
            palette: Palette::new(color),
            root: root.to_path_buf(),
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn location(&self, info: &TestFileInfo) -> String {
        let state = match (info.exists, info.has_content) {
            (false, _) => "missing",
            (true, false) => "empty",
            (true, true) => "has content",
        };
        format!(
            "{} ({}, {})",
            self.palette.highlight(&display_path(&info.path, &self.root)),
            info.layout,
            self.palette.muted(state)
        )
    }

    pub fn conflict(&self, info: &ConflictInfo) -> String {
        let kind = info
            .kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "{} {} conflict: {}\n  {}",
            self.palette.warning("!"),
            kind,
            info.conflicting_names
                .iter()
                .map(|n| self.palette.highlight(n))
                .collect::<Vec<_>>()
                .join(", "),
            info.suggestion
        )
    }

    pub fn preview(&self, preview: &Preview) -> String {
        let mut out = format!(
            "{} {} into {}\n",
            self.palette.muted("preview:"),
            preview.mode,
            self.palette.highlight(&display_path(&preview.path, &self.root))
        );
        for line in preview.code.lines() {
            out.push_str(&self.palette.muted("  | "));
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn validation(&self, label: &str, report: &ValidationReport) -> String {
        let mut out = if report.is_valid {
            format!("{} {}", self.palette.success("✓"), label)
        } else {
            format!("{} {}", self.palette.error("✗"), label)
        };
        for diagnostic in report.errors.iter().chain(&report.warnings) {
            let severity = match diagnostic.severity {
                Severity::Error => self.palette.error("error"),
                Severity::Warning => self.palette.warning("warning"),
            };
            out.push_str(&format!(
                "\n  {}:{}: {}: {}",
                diagnostic.line, diagnostic.column, severity, diagnostic.message
            ));
        }
        out
    }

    pub fn outcome(&self, outcome: &PipelineOutcome) -> String {
        let target = self
            .palette
            .highlight(&display_path(&outcome.target, &self.root));
        let mut out = match &outcome.status {
            MergeStatus::Inserted(result) if result.success => format!(
                "{} {} {} (lines {}-{})",
                self.palette.success("✓"),
                result.applied_mode,
                target,
                result.inserted_line_range.0,
                result.inserted_line_range.1
            ),
            MergeStatus::Inserted(result) => format!(
                "{} {} {}: {}",
                self.palette.error("✗"),
                result.applied_mode,
                target,
                result
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| result.message.clone())
            ),
            MergeStatus::Cancelled(point) => {
                let at = match point {
                    CancelPoint::Conflict => "at conflict",
                    CancelPoint::Preview => "at preview",
                };
                format!("{} cancelled {} for {}", self.palette.muted("-"), at, target)
            }
        };
        for warning in &outcome.warnings {
            out.push_str(&format!("\n  {} {}", self.palette.warning("warning:"), warning));
        }
        out
    }
}
