//! Writing generated code into a test file.
//!
//! Splicing is pure (`InsertionEngine::splice`) and the write happens
//! afterwards, so every strategy can be checked without touching disk.
//! Nothing here locks the target: callers must serialize runs against the
//! same path.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use super::scanner::{BoundaryRule, StructuralScanner};
use super::types::{InsertError, InsertMode, InsertResult, TestFileInfo};

/// Outcome of splicing code into existing content, before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub content: String,
    /// 1-based inclusive range of the inserted block.
    pub range: (usize, usize),
    pub applied_mode: InsertMode,
    pub message: String,
}

fn line_count(text: &str) -> usize {
    text.lines().count().max(1)
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Byte offset at which each line starts, plus the total length.
fn line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    let mut total = 0;
    for piece in text.split_inclusive('\n') {
        total += piece.len();
        offsets.push(total);
    }
    offsets
}

/// Applies insertion strategies to test files.
pub struct InsertionEngine<'a> {
    scanner: &'a dyn StructuralScanner,
}

impl<'a> InsertionEngine<'a> {
    pub fn new(scanner: &'a dyn StructuralScanner) -> Self {
        Self { scanner }
    }

    /// Splices `code` into `file` using `mode` and writes the result.
    ///
    /// Filesystem failures are reported through `InsertResult::error`.
    pub fn insert(&self, file: &TestFileInfo, code: &str, mode: InsertMode) -> InsertResult {
        let splice = self.splice(file.content(), code, mode);

        let written = ensure_parent_dir(&file.path).and_then(|_| fs::write(&file.path, &splice.content));
        match written {
            Ok(()) => {
                info!(
                    path = %file.path.display(),
                    mode = %splice.applied_mode,
                    start = splice.range.0,
                    end = splice.range.1,
                    "Wrote test file"
                );
                InsertResult {
                    success: true,
                    path: file.path.clone(),
                    inserted_line_range: splice.range,
                    message: splice.message,
                    error: None,
                    applied_mode: splice.applied_mode,
                    content: splice.content,
                }
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Failed to write test file");
                InsertResult {
                    success: false,
                    path: file.path.clone(),
                    inserted_line_range: splice.range,
                    message: format!("Could not write {}", file.path.display()),
                    error: Some(InsertError::Filesystem {
                        path: file.path.clone(),
                        message: e.to_string(),
                    }),
                    applied_mode: splice.applied_mode,
                    content: String::new(),
                }
            }
        }
    }

    /// Computes the final content for `mode` without writing anything.
    pub fn splice(&self, existing: Option<&str>, code: &str, mode: InsertMode) -> Splice {
        let existing = existing.filter(|c| !c.trim().is_empty());
        match (mode, existing) {
            (InsertMode::CreateNewFile, _) | (_, None) => create(code),
            (InsertMode::Append, Some(existing)) => append(existing, code),
            (InsertMode::ReplaceGroup, Some(existing)) => self.replace_group(existing, code),
        }
    }

    fn replace_group(&self, existing: &str, code: &str) -> Splice {
        let Some(group) = self.scanner.first_group(code) else {
            debug!("No test group in generated code, appending instead");
            return degraded(append(existing, code), "no test group in generated code");
        };

        let lines: Vec<&str> = existing.lines().collect();
        let Some(decl) = self.scanner.find_group(&lines, &group) else {
            debug!(group = %group, "Group not found in existing file, appending instead");
            return degraded(
                append(existing, code),
                &format!("group '{}' not found in existing file", group),
            );
        };

        let start = self.scanner.decorators_start(&lines, decl);
        let mut end = self.scanner.block_end(&lines, decl, BoundaryRule::SkipComments);
        while end > decl + 1 && self.scanner.is_blank(lines[end - 1]) {
            end -= 1;
        }

        let offsets = line_offsets(existing);
        let before = &existing[..offsets[start]];
        let after = &existing[offsets[end]..];
        let block = code.trim_matches('\n');

        let mut content = String::with_capacity(existing.len() + block.len() + 4);
        content.push_str(before);
        if start > 0 && !self.scanner.is_blank(lines[start - 1]) {
            content.push('\n');
        }
        let code_start = content.lines().count() + 1;
        content.push_str(block);
        content.push('\n');
        if end < lines.len() && !self.scanner.is_blank(lines[end]) {
            content.push('\n');
        }
        content.push_str(after);

        let code_end = code_start + line_count(block) - 1;
        debug!(group = %group, replaced = end - start, "Replaced test group");

        Splice {
            content,
            range: (code_start, code_end),
            applied_mode: InsertMode::ReplaceGroup,
            message: format!(
                "Replaced group '{}' ({} lines) with {} lines",
                group,
                end - start,
                line_count(block)
            ),
        }
    }
}

fn create(code: &str) -> Splice {
    Splice {
        content: code.to_string(),
        range: (1, line_count(code)),
        applied_mode: InsertMode::CreateNewFile,
        message: format!("Created test file with {} lines", line_count(code)),
    }
}

fn append(existing: &str, code: &str) -> Splice {
    let kept = existing.trim_end();
    let block = code.trim_matches('\n');
    let existing_lines = kept.lines().count();

    let mut content = String::with_capacity(kept.len() + block.len() + 4);
    content.push_str(kept);
    content.push_str("\n\n\n");
    content.push_str(block);
    content.push('\n');

    Splice {
        content,
        range: (existing_lines + 1, existing_lines + 2 + line_count(block)),
        applied_mode: InsertMode::Append,
        message: format!(
            "Appended {} lines after line {}",
            line_count(block),
            existing_lines
        ),
    }
}

fn degraded(mut splice: Splice, reason: &str) -> Splice {
    warn!(reason, "Group replacement degraded to append");
    splice.message = format!("{} ({})", splice.message, reason);
    splice
}
