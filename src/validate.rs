//! Heuristic checks over generated test code.
//!
//! These are line-level lint checks, not a parse: code that passes may still
//! fail to import.

use serde::Serialize;
use std::fmt;

use crate::merge::scanner::{BoundaryRule, IndentScanner, StructuralScanner};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One finding, located by 1-based line and 0-based column.
///
/// Line 0 means the finding concerns the code as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    fn warning(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.line, self.column, self.severity, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Runs every check over `code`.
pub fn validate(code: &str) -> ValidationReport {
    if code.trim().is_empty() {
        return ValidationReport {
            is_valid: false,
            errors: vec![Diagnostic {
                line: 0,
                column: 0,
                message: "Code is empty".to_string(),
                severity: Severity::Error,
            }],
            warnings: Vec::new(),
        };
    }

    let scanner = IndentScanner::new();
    let lines: Vec<&str> = code.lines().collect();
    let mut warnings = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let indent: String = line
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        if indent.contains('\t') && indent.contains(' ') {
            warnings.push(Diagnostic::warning(
                i + 1,
                0,
                "Mixed tabs and spaces in indentation",
            ));
        }

        let trimmed = line.trim_end();
        if trimmed.len() != line.len() && !trimmed.trim().is_empty() {
            warnings.push(Diagnostic::warning(i + 1, trimmed.len(), "Trailing whitespace"));
        }
    }

    for (i, line) in lines.iter().enumerate() {
        let Some(group) = scanner.group_name(line) else {
            continue;
        };
        let end = scanner.block_end(&lines, i, BoundaryRule::AnyLine);
        let has_test = lines[i + 1..end]
            .iter()
            .any(|l| scanner.method_name(l).is_some());
        if !has_test {
            warnings.push(Diagnostic::warning(
                i + 1,
                scanner.indent_of(line),
                format!(
                    "Test class '{}' has no test methods (methods should start with 'test_')",
                    group
                ),
            ));
        }
    }

    warnings.sort_by_key(|d| (d.line, d.column));
    ValidationReport {
        is_valid: true,
        errors: Vec::new(),
        warnings,
    }
}
