//! Heuristic structural scanning of Python test source.
//!
//! Every line and indentation heuristic used by the merge engine lives
//! behind `StructuralScanner`, so a grammar-backed implementation can be
//! dropped in without touching the parser, the conflict detector or the
//! insertion engine.
//!
//! Known false negatives of `IndentScanner`:
//! - a multi-line string containing a line such as `def test_x():` is
//!   reported as a method declaration
//! - a nested `def test_*` inside a test body is reported as its own method
//! - an unindented line inside a multi-line string ends the enclosing block

use regex::Regex;
use std::sync::OnceLock;

/// Line comment marker.
pub const COMMENT_MARKER: char = '#';

/// Decorator marker.
pub const DECORATOR_MARKER: char = '@';

/// Prefix of test-group class names.
pub const GROUP_PREFIX: &str = "Test";

/// Prefix of test method names.
pub const METHOD_PREFIX: &str = "test_";

/// How the end of an indented block is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRule {
    /// Any non-blank line at or below the opening indentation ends the block.
    AnyLine,
    /// Like `AnyLine`, but comment lines never end the block.
    SkipComments,
}

/// Line-oriented structural queries over source text.
pub trait StructuralScanner {
    /// Indentation width of `line`.
    fn indent_of(&self, line: &str) -> usize;

    /// Returns true for empty or whitespace-only lines.
    fn is_blank(&self, line: &str) -> bool {
        line.trim().is_empty()
    }

    /// Returns true for lines holding only a comment.
    fn is_comment(&self, line: &str) -> bool;

    /// Returns true for decorator lines.
    fn is_decorator(&self, line: &str) -> bool;

    /// Returns true for import statement lines.
    fn is_import(&self, line: &str) -> bool;

    /// Name of the test group declared on `line`, if any.
    fn group_name<'a>(&self, line: &'a str) -> Option<&'a str>;

    /// Name of the test method declared on `line`, if any.
    fn method_name<'a>(&self, line: &'a str) -> Option<&'a str>;

    /// Name of any function declared on `line`, if any.
    fn function_name<'a>(&self, line: &'a str) -> Option<&'a str>;

    /// First test group declared anywhere in `text`.
    fn first_group(&self, text: &str) -> Option<String>;

    /// Index of the first line declaring the group `name`.
    fn find_group(&self, lines: &[&str], name: &str) -> Option<usize> {
        lines
            .iter()
            .position(|line| self.group_name(line) == Some(name))
    }

    /// Index of the first line declaring the method `name`.
    fn find_method(&self, lines: &[&str], name: &str) -> Option<usize> {
        lines
            .iter()
            .position(|line| self.method_name(line) == Some(name))
    }

    /// Index of the first of the decorator lines directly above `decl`.
    fn decorators_start(&self, lines: &[&str], decl: usize) -> usize {
        let mut start = decl;
        while start > 0 && self.is_decorator(lines[start - 1]) {
            start -= 1;
        }
        start
    }

    /// Exclusive end index of the block whose header is `lines[start]`.
    ///
    /// The block takes every following line that is blank or indented deeper
    /// than the header, and stops at the first line that ends it under `rule`.
    fn block_end(&self, lines: &[&str], start: usize, rule: BoundaryRule) -> usize {
        let Some(header) = lines.get(start) else {
            return lines.len();
        };
        let indent = self.indent_of(header);

        for (offset, line) in lines[start + 1..].iter().enumerate() {
            if self.is_blank(line) || self.indent_of(line) > indent {
                continue;
            }
            if rule == BoundaryRule::SkipComments && self.is_comment(line) {
                continue;
            }
            return start + 1 + offset;
        }
        lines.len()
    }
}

/// Indentation-driven scanner for Python source.
#[derive(Debug, Clone, Copy)]
pub struct IndentScanner {
    tab_width: usize,
}

impl Default for IndentScanner {
    fn default() -> Self {
        Self { tab_width: 4 }
    }
}

impl IndentScanner {
    /// Creates a scanner that counts a tab as four columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many columns a tab counts for.
    pub fn with_tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = tab_width;
        self
    }
}

fn group_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[ \t]*class[ \t]+(Test\w*)[ \t]*[:(]").expect("Invalid regex pattern")
    })
}

fn group_decl_multiline() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*class[ \t]+(Test\w*)[ \t]*[:(]").expect("Invalid regex pattern")
    })
}

fn function_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)[ \t]*\(")
            .expect("Invalid regex pattern")
    })
}

impl StructuralScanner for IndentScanner {
    fn indent_of(&self, line: &str) -> usize {
        line.chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .map(|c| if c == '\t' { self.tab_width } else { 1 })
            .sum()
    }

    fn is_comment(&self, line: &str) -> bool {
        line.trim_start().starts_with(COMMENT_MARKER)
    }

    fn is_decorator(&self, line: &str) -> bool {
        line.trim_start().starts_with(DECORATOR_MARKER)
    }

    fn is_import(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        trimmed.starts_with("import ") || trimmed.starts_with("from ")
    }

    fn group_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        group_decl()
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    fn method_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.function_name(line)
            .filter(|name| name.starts_with(METHOD_PREFIX))
    }

    fn function_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        function_decl()
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    fn first_group(&self, text: &str) -> Option<String> {
        group_decl_multiline()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}
