//! Source-side context for a generation request.
//!
//! Locates the function under test in a Python source file and derives what
//! the rest of the pipeline needs from it: the dotted module path for
//! imports, the enclosing class for methods, and the request context sent to
//! the generation service.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::client::{RequestContext, TargetMode};
use crate::merge::scanner::{BoundaryRule, IndentScanner, StructuralScanner};

/// Errors raised while locating the target in a source file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("function '{0}' not found in source")]
    FunctionNotFound(String),

    #[error("line {line} is outside the source ({total} lines)")]
    LineOutOfRange { line: usize, total: usize },

    #[error("no function encloses line {0}")]
    NoFunctionAtLine(usize),
}

/// What part of the source file a request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// The whole file.
    File,
    /// The first function with this name.
    Function(String),
    /// The innermost function enclosing this 1-based line.
    Line(usize),
}

/// The function selected for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFunction {
    pub name: String,
    /// Name of the directly enclosing class, if any.
    pub class_name: Option<String>,
    /// True when the first parameter is `self` or `cls`.
    pub is_method: bool,
    pub is_async: bool,
    /// 1-based inclusive line span, decorators included.
    pub line_range: (usize, usize),
    pub code: String,
}

/// Everything known about the source side of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub source_path: PathBuf,
    /// Path relative to the project root, or the path as given when it is
    /// not under the root.
    pub relative_path: PathBuf,
    /// Dotted module path, e.g. `src.utils.math`.
    pub module_path: String,
    pub target: Option<TargetFunction>,
}

fn class_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[ \t]*class[ \t]+([A-Za-z_]\w*)[ \t]*[:(]").expect("Invalid regex pattern")
    })
}

fn first_param() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"def[ \t]+\w+[ \t]*\([ \t]*\*{0,2}([A-Za-z_]\w*)").expect("Invalid regex pattern")
    })
}

impl SourceContext {
    /// Analyzes `source` (the contents of `source_path`) for `selector`.
    pub fn analyze(
        root: &Path,
        source_path: &Path,
        source: &str,
        selector: &Selector,
    ) -> Result<Self, ContextError> {
        let scanner = IndentScanner::new();
        let lines: Vec<&str> = source.lines().collect();

        let decl = match selector {
            Selector::File => None,
            Selector::Function(name) => Some(
                lines
                    .iter()
                    .position(|l| scanner.function_name(l) == Some(name.as_str()))
                    .ok_or_else(|| ContextError::FunctionNotFound(name.clone()))?,
            ),
            Selector::Line(line) => Some(enclosing_function(&scanner, &lines, *line)?),
        };

        let target = decl.map(|decl| target_at(&scanner, &lines, decl));
        let relative_path = relative_to(root, source_path);
        let module_path = module_path(&relative_path);

        debug!(
            module = %module_path,
            target = ?target.as_ref().map(|t| t.name.as_str()),
            class = ?target.as_ref().and_then(|t| t.class_name.as_deref()),
            "Analyzed source context"
        );

        Ok(Self {
            source_path: source_path.to_path_buf(),
            relative_path,
            module_path,
            target,
        })
    }

    /// Target mode reported to the generation service.
    pub fn mode(&self) -> TargetMode {
        match &self.target {
            None => TargetMode::File,
            Some(t) if t.class_name.is_some() => TargetMode::Method,
            Some(_) => TargetMode::Function,
        }
    }

    /// Context block for the submission request.
    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            mode: self.mode(),
            target_function: self.target.as_ref().map(|t| t.name.clone()),
        }
    }

    /// Name imported from the module under test, if any.
    ///
    /// Methods import their class; plain functions import themselves.
    pub fn import_symbol(&self) -> Option<&str> {
        let target = self.target.as_ref()?;
        Some(target.class_name.as_deref().unwrap_or(&target.name))
    }

    /// Code sent as `source_code`: the selected function, or the whole file.
    pub fn source_for_request<'a>(&'a self, source: &'a str) -> &'a str {
        self.target.as_ref().map_or(source, |t| t.code.as_str())
    }
}

fn enclosing_function(
    scanner: &IndentScanner,
    lines: &[&str],
    line: usize,
) -> Result<usize, ContextError> {
    if line == 0 || line > lines.len() {
        return Err(ContextError::LineOutOfRange {
            line,
            total: lines.len(),
        });
    }
    let target = line - 1;

    (0..lines.len())
        .filter(|&i| scanner.function_name(lines[i]).is_some())
        .filter(|&i| {
            let start = scanner.decorators_start(lines, i);
            start <= target && target < scanner.block_end(lines, i, BoundaryRule::AnyLine)
        })
        .last()
        .ok_or(ContextError::NoFunctionAtLine(line))
}

fn target_at(scanner: &IndentScanner, lines: &[&str], decl: usize) -> TargetFunction {
    let header = lines[decl];
    let name = scanner.function_name(header).unwrap_or_default().to_string();

    let start = scanner.decorators_start(lines, decl);
    let mut end = scanner.block_end(lines, decl, BoundaryRule::AnyLine);
    while end > decl + 1 && scanner.is_blank(lines[end - 1]) {
        end -= 1;
    }

    let class_name = enclosing_class(scanner, lines, decl);
    let first = first_param()
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    let is_method = class_name.is_some() && matches!(first, Some("self") | Some("cls"));

    TargetFunction {
        name,
        class_name,
        is_method,
        is_async: header.trim_start().starts_with("async "),
        line_range: (start + 1, end),
        code: lines[start..end].join("\n"),
    }
}

/// Class declared on the nearest less-indented line above `decl`.
fn enclosing_class(scanner: &IndentScanner, lines: &[&str], decl: usize) -> Option<String> {
    let indent = scanner.indent_of(lines[decl]);
    if indent == 0 {
        return None;
    }
    let parent = lines[..decl].iter().rev().find(|l| {
        !scanner.is_blank(l) && !scanner.is_comment(l) && scanner.indent_of(l) < indent
    })?;
    class_decl()
        .captures(parent)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Dotted module path for a root-relative `.py` path.
///
/// `src/a/b.py` becomes `src.a.b`; a package `__init__.py` maps to its
/// package.
pub fn module_path(relative: &Path) -> String {
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(last) = parts.pop() {
        let stem = last.strip_suffix(".py").unwrap_or(&last).to_string();
        if stem != "__init__" || parts.is_empty() {
            parts.push(stem);
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"import math


def add(a, b):
    return a + b


class Calculator:
    """Keeps a running total."""

    def __init__(self):
        self.total = 0

    @staticmethod
    def square(x):
        return x * x

    async def fetch(self, key):
        return key

    def reset(self):
        self.total = 0
"#;

    fn analyze(selector: Selector) -> Result<SourceContext, ContextError> {
        SourceContext::analyze(
            Path::new("/proj"),
            Path::new("/proj/src/simple_math.py"),
            SOURCE,
            &selector,
        )
    }

    #[test]
    fn test_module_path_from_relative_path() {
        assert_eq!(module_path(Path::new("src/a/b.py")), "src.a.b");
        assert_eq!(module_path(Path::new("calc.py")), "calc");
        assert_eq!(module_path(Path::new("pkg/__init__.py")), "pkg");
        assert_eq!(module_path(Path::new("./pkg/mod.py")), "pkg.mod");
    }

    #[test]
    fn test_plain_function_by_name() {
        let ctx = analyze(Selector::Function("add".into())).unwrap();
        assert_eq!(ctx.module_path, "src.simple_math");
        assert_eq!(ctx.relative_path, PathBuf::from("src/simple_math.py"));
        assert_eq!(ctx.mode(), TargetMode::Function);
        assert_eq!(ctx.import_symbol(), Some("add"));

        let target = ctx.target.unwrap();
        assert!(!target.is_method);
        assert_eq!(target.line_range, (4, 5));
        assert_eq!(target.code, "def add(a, b):\n    return a + b");
    }

    #[test]
    fn test_method_imports_class() {
        let ctx = analyze(Selector::Function("reset".into())).unwrap();
        let target = ctx.target.as_ref().unwrap();
        assert_eq!(target.class_name.as_deref(), Some("Calculator"));
        assert!(target.is_method);
        assert_eq!(ctx.mode(), TargetMode::Method);
        assert_eq!(ctx.import_symbol(), Some("Calculator"));
        assert_eq!(
            ctx.request_context().target_function.as_deref(),
            Some("reset")
        );
    }

    #[test]
    fn test_static_method_is_not_instance_method() {
        let ctx = analyze(Selector::Function("square".into())).unwrap();
        let target = ctx.target.unwrap();
        assert_eq!(target.class_name.as_deref(), Some("Calculator"));
        assert!(!target.is_method);
        assert!(target.code.starts_with("@staticmethod"));
    }

    #[test]
    fn test_async_method() {
        let ctx = analyze(Selector::Function("fetch".into())).unwrap();
        assert!(ctx.target.unwrap().is_async);
    }

    #[test]
    fn test_selector_by_line() {
        let ctx = analyze(Selector::Line(12)).unwrap();
        assert_eq!(ctx.target.unwrap().name, "__init__");

        let ctx = analyze(Selector::Line(15)).unwrap();
        assert_eq!(ctx.target.unwrap().name, "square");
    }

    #[test]
    fn test_selector_errors() {
        assert_eq!(
            analyze(Selector::Function("missing".into())).unwrap_err(),
            ContextError::FunctionNotFound("missing".into())
        );
        assert_eq!(
            analyze(Selector::Line(1)).unwrap_err(),
            ContextError::NoFunctionAtLine(1)
        );
        assert!(matches!(
            analyze(Selector::Line(999)).unwrap_err(),
            ContextError::LineOutOfRange { line: 999, .. }
        ));
    }

    #[test]
    fn test_file_mode() {
        let ctx = analyze(Selector::File).unwrap();
        assert_eq!(ctx.mode(), TargetMode::File);
        assert_eq!(ctx.import_symbol(), None);
        assert_eq!(ctx.source_for_request(SOURCE), SOURCE);
        assert!(ctx.request_context().target_function.is_none());
    }
}
