//! Data model shared by the merge stages.
//!
//! Everything here is transient: built fresh for one pipeline run and never
//! cached. A `TestFileInfo` in particular is a snapshot that goes stale as
//! soon as the file changes on disk.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One generated test method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMethod {
    pub name: String,
    /// Decorators, declaration and body, as extracted.
    pub code: String,
    pub line_count: usize,
    /// Decorator lines directly above the declaration, trimmed.
    pub decorators: Vec<String>,
}

/// Structural facts extracted from one generation-service response.
///
/// Method names are unique within one parse result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTestCode {
    /// Extracted code with import lines removed.
    pub raw_code: String,
    pub import_lines: Vec<String>,
    /// Name of the first test group, or empty when the code is function-based.
    pub group_name: String,
    pub methods: Vec<TestMethod>,
    pub uses_shared_setup: bool,
    pub uses_data_driven_decl: bool,
    /// Names of module-level shared-setup functions.
    pub module_level_setup_names: Vec<String>,
}

impl ParsedTestCode {
    /// Returns true when neither a group nor any method was recognised.
    ///
    /// Not fatal: the raw body is still usable as-is.
    pub fn is_ambiguous(&self) -> bool {
        self.group_name.is_empty() && self.methods.is_empty()
    }

    /// Returns true when a test group was found.
    pub fn has_group(&self) -> bool {
        !self.group_name.is_empty()
    }

    /// Names of all parsed methods, in source order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }
}

/// Where test files live in a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutConvention {
    /// A conventional test directory at the project root.
    TestDirectory(String),
    /// Next to the source file.
    Colocated,
}

impl fmt::Display for LayoutConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutConvention::TestDirectory(dir) => write!(f, "{}/", dir),
            LayoutConvention::Colocated => write!(f, "co-located"),
        }
    }
}

/// Snapshot of a resolved test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFileInfo {
    pub path: PathBuf,
    pub exists: bool,
    /// True only when the existing content is not all whitespace.
    pub has_content: bool,
    pub existing_content: Option<String>,
    pub layout: LayoutConvention,
}

impl TestFileInfo {
    /// Existing content when the file has any non-whitespace text.
    pub fn content(&self) -> Option<&str> {
        if self.has_content {
            self.existing_content.as_deref()
        } else {
            None
        }
    }
}

/// Which kinds of names collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Group,
    Method,
    Both,
}

impl ConflictKind {
    /// Returns true when the group name collided.
    pub fn includes_group(self) -> bool {
        matches!(self, ConflictKind::Group | ConflictKind::Both)
    }

    /// Returns true when at least one method name collided.
    pub fn includes_method(self) -> bool {
        matches!(self, ConflictKind::Method | ConflictKind::Both)
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Group => write!(f, "group"),
            ConflictKind::Method => write!(f, "method"),
            ConflictKind::Both => write!(f, "group and method"),
        }
    }
}

/// Result of comparing parsed names against an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub has_conflict: bool,
    pub conflicting_names: Vec<String>,
    pub suggestion: String,
    /// `None` exactly when there is no conflict.
    pub kind: Option<ConflictKind>,
    /// Suggested replacement group name, for group collisions.
    pub suggested_group_name: Option<String>,
}

impl ConflictInfo {
    /// A result with no collisions.
    pub fn none() -> Self {
        Self {
            has_conflict: false,
            conflicting_names: Vec::new(),
            suggestion: String::new(),
            kind: None,
            suggested_group_name: None,
        }
    }
}

/// How generated code is written into the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Write the code as the whole file.
    CreateNewFile,
    /// Add the code after the existing content.
    Append,
    /// Swap the existing group of the same name for the new code.
    ReplaceGroup,
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertMode::CreateNewFile => write!(f, "create"),
            InsertMode::Append => write!(f, "append"),
            InsertMode::ReplaceGroup => write!(f, "replace-group"),
        }
    }
}

/// Errors captured into an `InsertResult` rather than returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    /// Reading or writing the target failed.
    #[error("filesystem error at {}: {message}", path.display())]
    Filesystem { path: PathBuf, message: String },
}

/// Terminal output of one insertion. Not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertResult {
    pub success: bool,
    pub path: PathBuf,
    /// 1-based inclusive line range of the inserted block.
    pub inserted_line_range: (usize, usize),
    pub message: String,
    pub error: Option<InsertError>,
    /// The mode actually applied, after any degradation.
    pub applied_mode: InsertMode,
    /// Final file content; empty when the write failed.
    pub content: String,
}
