//! Import block synthesis.

use std::collections::BTreeSet;

use crate::context::SourceContext;

use super::types::ParsedTestCode;

/// Import line for the test framework, always emitted.
pub const FRAMEWORK_IMPORT: &str = "import pytest";

/// Top-level module names treated as standard library.
pub const STDLIB_MODULES: &[&str] = &[
    "os",
    "sys",
    "re",
    "json",
    "typing",
    "unittest",
    "pathlib",
    "collections",
    "datetime",
    "math",
    "itertools",
    "functools",
    "time",
    "random",
    "io",
    "tempfile",
    "asyncio",
    "dataclasses",
];

/// Import group, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportBucket {
    StandardLibrary,
    ThirdParty,
    Local,
}

/// Module path named by an import line.
fn imported_module(line: &str) -> &str {
    let line = line.trim();
    let rest = line
        .strip_prefix("from ")
        .or_else(|| line.strip_prefix("import "))
        .unwrap_or(line)
        .trim_start();
    rest.split(|c: char| c.is_whitespace() || c == ',')
        .next()
        .unwrap_or_default()
}

/// Decides which bucket an import line belongs to.
pub fn bucket_of(line: &str) -> ImportBucket {
    let module = imported_module(line);
    let first = module.split('.').next().unwrap_or_default();

    if STDLIB_MODULES.contains(&first) {
        ImportBucket::StandardLibrary
    } else if module.starts_with('.') || module.contains('.') {
        ImportBucket::Local
    } else {
        ImportBucket::ThirdParty
    }
}

/// Deduplicates, groups and sorts import lines.
///
/// The result has one empty string between non-empty buckets.
pub fn group_imports<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buckets: [BTreeSet<String>; 3] = Default::default();
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        buckets[bucket_of(line) as usize].insert(line.to_string());
    }

    let mut out = Vec::new();
    for bucket in buckets.into_iter().filter(|b| !b.is_empty()) {
        if !out.is_empty() {
            out.push(String::new());
        }
        out.extend(bucket);
    }
    out
}

/// Import line for the unit under test, if the context names one.
pub fn subject_import(context: &SourceContext) -> Option<String> {
    if context.module_path.is_empty() {
        return None;
    }
    Some(match context.import_symbol() {
        Some(symbol) => format!("from {} import {}", context.module_path, symbol),
        None => format!("import {}", context.module_path),
    })
}

/// Builds the full import block for generated tests.
///
/// Combines the framework import, the unit under test and every import the
/// response already carried.
pub fn synthesize(context: &SourceContext, parsed: &ParsedTestCode) -> Vec<String> {
    let mut lines = vec![FRAMEWORK_IMPORT.to_string()];
    lines.extend(subject_import(context));
    lines.extend(parsed.import_lines.iter().cloned());
    group_imports(lines)
}

/// Drops imports already present verbatim in `existing`, then regroups.
pub fn missing_from(imports: &[String], existing: &str) -> Vec<String> {
    let present: BTreeSet<&str> = existing.lines().map(str::trim).collect();
    group_imports(
        imports
            .iter()
            .filter(|line| !line.is_empty() && !present.contains(line.trim())),
    )
}
