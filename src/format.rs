//! Optional pass through an external Python formatter.
//!
//! Formatting is cosmetic. With `skip_on_error` set, a missing or failing
//! formatter leaves the code untouched and only produces a warning.

use serde::Deserialize;
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

use crate::settings::FormatConfig;

/// Line length black uses by default.
pub const BLACK_DEFAULT_LINE_LENGTH: u32 = 88;

/// Line length substituted for autopep8 when black's default was requested.
pub const PEP8_LINE_LENGTH: u32 = 79;

/// Which external formatter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formatter {
    #[default]
    None,
    Black,
    Autopep8,
}

impl fmt::Display for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formatter::None => write!(f, "none"),
            Formatter::Black => write!(f, "black"),
            Formatter::Autopep8 => write!(f, "autopep8"),
        }
    }
}

impl Formatter {
    /// Program and arguments for formatting stdin to stdout.
    ///
    /// Returns `None` for `Formatter::None`.
    pub fn command(self, line_length: u32) -> Option<(&'static str, Vec<String>)> {
        match self {
            Formatter::None => None,
            Formatter::Black => Some((
                "black",
                vec![
                    "-q".to_string(),
                    "-l".to_string(),
                    line_length.to_string(),
                    "-".to_string(),
                ],
            )),
            Formatter::Autopep8 => {
                let length = if line_length == BLACK_DEFAULT_LINE_LENGTH {
                    PEP8_LINE_LENGTH
                } else {
                    line_length
                };
                Some((
                    "autopep8",
                    vec![
                        "--max-line-length".to_string(),
                        length.to_string(),
                        "-".to_string(),
                    ],
                ))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("cannot format empty code")]
    EmptyCode,

    #[error("{program} is not installed or not on PATH")]
    NotInstalled {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("I/O error while running formatter: {0}")]
    Io(#[from] io::Error),
}

/// Result of a formatting pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOutcome {
    pub code: String,
    /// True when the formatter actually ran and its output was used.
    pub formatted: bool,
    pub formatter: Formatter,
    /// Set when formatting was skipped because of an error.
    pub warning: Option<String>,
}

/// Formats `code` according to `config`.
pub fn format_code(code: &str, config: &FormatConfig) -> Result<FormatOutcome, FormatError> {
    if code.trim().is_empty() {
        return Err(FormatError::EmptyCode);
    }

    let Some((program, args)) = config.formatter.command(config.line_length) else {
        return Ok(FormatOutcome {
            code: code.to_string(),
            formatted: false,
            formatter: Formatter::None,
            warning: None,
        });
    };

    match run_formatter(program, &args, code) {
        Ok(formatted) => {
            debug!(formatter = %config.formatter, "Formatted generated code");
            Ok(FormatOutcome {
                code: formatted,
                formatted: true,
                formatter: config.formatter,
                warning: None,
            })
        }
        Err(e) if config.skip_on_error => {
            warn!(formatter = %config.formatter, error = %e, "Formatting skipped");
            Ok(FormatOutcome {
                code: code.to_string(),
                formatted: false,
                formatter: config.formatter,
                warning: Some(e.to_string()),
            })
        }
        Err(e) => Err(e),
    }
}

fn run_formatter(program: &str, args: &[String], code: &str) -> Result<String, FormatError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FormatError::NotInstalled {
                    program: program.to_string(),
                    source,
                }
            } else {
                FormatError::Io(source)
            }
        })?;

    // Feed stdin from a separate thread so a large output cannot block us.
    let writer = child.stdin.take().map(|mut stdin| {
        let input = code.to_string();
        std::thread::spawn(move || stdin.write_all(input.as_bytes()))
    });

    let output = child.wait_with_output()?;
    if let Some(writer) = writer {
        if let Ok(Err(e)) = writer.join() {
            debug!(error = %e, "Formatter closed stdin early");
        }
    }

    if !output.status.success() {
        return Err(FormatError::Failed {
            program: program.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(formatter: Formatter, skip_on_error: bool) -> FormatConfig {
        FormatConfig {
            formatter,
            line_length: BLACK_DEFAULT_LINE_LENGTH,
            skip_on_error,
        }
    }

    #[test]
    fn test_commands() {
        let (program, args) = Formatter::Black.command(100).unwrap();
        assert_eq!(program, "black");
        assert_eq!(args, vec!["-q", "-l", "100", "-"]);

        let (program, args) = Formatter::Autopep8.command(88).unwrap();
        assert_eq!(program, "autopep8");
        assert_eq!(args, vec!["--max-line-length", "79", "-"]);

        let (_, args) = Formatter::Autopep8.command(120).unwrap();
        assert_eq!(args[1], "120");

        assert!(Formatter::None.command(88).is_none());
    }

    #[test]
    fn test_none_is_noop() {
        let outcome = format_code("x=1\n", &config(Formatter::None, false)).unwrap();
        assert_eq!(outcome.code, "x=1\n");
        assert!(!outcome.formatted);
        assert!(outcome.warning.is_none());
    }

    #[test]
    fn test_empty_code_is_error() {
        let err = format_code("  \n", &config(Formatter::None, true)).unwrap_err();
        assert!(matches!(err, FormatError::EmptyCode));
    }

    #[test]
    fn test_missing_program_reports_not_installed() {
        let err = run_formatter("testsplice-no-such-formatter", &[], "x = 1\n").unwrap_err();
        assert!(matches!(err, FormatError::NotInstalled { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_program_over_stdin() {
        let out = run_formatter("cat", &["-".to_string()], "x = 1\n").unwrap();
        assert_eq!(out, "x = 1\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_reports_stderr() {
        let err = run_formatter("false", &[], "x = 1\n").unwrap_err();
        assert!(matches!(err, FormatError::Failed { .. }));
    }

    #[test]
    fn test_deserialize_formatter_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            formatter: Formatter,
        }
        let parsed: Wrapper = serde_json::from_str(r#"{"formatter":"autopep8"}"#).unwrap();
        assert_eq!(parsed.formatter, Formatter::Autopep8);
    }
}
