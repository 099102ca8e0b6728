//! Extraction of test code and structural facts from a service response.
//!
//! The response is conversational text, not a strict grammar. Code is taken
//! from fenced blocks when there are any, otherwise the whole response is
//! treated as code.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::scanner::{BoundaryRule, StructuralScanner};
use super::types::{ParsedTestCode, TestMethod};

/// Decorator token marking a shared-setup declaration.
pub const SHARED_SETUP_TOKEN: &str = "@pytest.fixture";

/// Decorator token marking a data-driven test.
pub const DATA_DRIVEN_TOKEN: &str = "@pytest.mark.parametrize";

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[^\n`]*\n(.*?)(?:```|\z)").expect("Invalid regex pattern")
    })
}

/// Pulls runnable code out of a response.
///
/// Multiple fenced blocks are joined with a blank line. A fence left open
/// runs to the end of the response. Without any fence the trimmed response
/// itself is returned.
pub fn extract_code(response: &str) -> String {
    let blocks: Vec<&str> = fenced_block()
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end())
        .collect();

    if blocks.is_empty() {
        debug!("No fenced code block in response, using whole text");
        return response.trim().to_string();
    }

    blocks
        .into_iter()
        .filter(|b| !b.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parses generation-service responses into `ParsedTestCode`.
pub struct ResponseParser<'a> {
    scanner: &'a dyn StructuralScanner,
}

impl<'a> ResponseParser<'a> {
    pub fn new(scanner: &'a dyn StructuralScanner) -> Self {
        Self { scanner }
    }

    /// Parses a raw response.
    ///
    /// Import detection is a line-prefix check, so an import nested inside a
    /// function body is also pulled out of the body.
    pub fn parse(&self, response: &str) -> ParsedTestCode {
        let code = extract_code(response);

        let mut import_lines = Vec::new();
        let mut body = Vec::new();
        for line in code.lines() {
            if self.scanner.is_import(line) {
                import_lines.push(line.trim().to_string());
            } else {
                body.push(line);
            }
        }
        let raw_code = trim_blank_edges(&body, self.scanner).join("\n");

        let group_name = self.scanner.first_group(&raw_code).unwrap_or_default();
        let methods = self.collect_methods(&raw_code);

        let parsed = ParsedTestCode {
            uses_shared_setup: code.contains(SHARED_SETUP_TOKEN),
            uses_data_driven_decl: code.contains(DATA_DRIVEN_TOKEN),
            module_level_setup_names: self.module_level_setup_names(&raw_code),
            raw_code,
            import_lines,
            group_name,
            methods,
        };

        if parsed.is_ambiguous() {
            warn!("No test group or test methods recognised, keeping raw body");
        } else {
            debug!(
                group = %parsed.group_name,
                methods = parsed.methods.len(),
                imports = parsed.import_lines.len(),
                "Parsed generated test code"
            );
        }
        parsed
    }

    fn collect_methods(&self, code: &str) -> Vec<TestMethod> {
        let lines: Vec<&str> = code.lines().collect();
        let mut seen = HashSet::new();
        let mut methods = Vec::new();

        for (decl, line) in lines.iter().enumerate() {
            let Some(name) = self.scanner.method_name(line) else {
                continue;
            };
            if !seen.insert(name) {
                debug!(name, "Skipping duplicate test method declaration");
                continue;
            }

            let start = self.scanner.decorators_start(&lines, decl);
            let mut end = self.scanner.block_end(&lines, decl, BoundaryRule::AnyLine);
            while end > decl + 1 && self.scanner.is_blank(lines[end - 1]) {
                end -= 1;
            }

            methods.push(TestMethod {
                name: name.to_string(),
                code: lines[start..end].join("\n"),
                line_count: end - start,
                decorators: lines[start..decl]
                    .iter()
                    .map(|l| l.trim().to_string())
                    .collect(),
            });
        }
        methods
    }

    fn module_level_setup_names(&self, code: &str) -> Vec<String> {
        let lines: Vec<&str> = code.lines().collect();
        let mut names = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if self.scanner.indent_of(line) != 0 || !line.starts_with(SHARED_SETUP_TOKEN) {
                continue;
            }
            let decl = lines[i + 1..]
                .iter()
                .find(|l| !self.scanner.is_decorator(l) && !self.scanner.is_blank(l));
            if let Some(decl) = decl {
                if self.scanner.indent_of(decl) == 0 {
                    if let Some(name) = self.scanner.function_name(decl) {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
            }
        }
        names
    }
}

fn trim_blank_edges<'l>(lines: &[&'l str], scanner: &dyn StructuralScanner) -> Vec<&'l str> {
    let start = lines
        .iter()
        .position(|l| !scanner.is_blank(l))
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !scanner.is_blank(l))
        .map_or(start, |i| i + 1);
    lines[start..end].to_vec()
}
