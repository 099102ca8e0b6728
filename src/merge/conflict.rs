//! Name collision detection against an existing test file.

use regex::Regex;
use tracing::debug;

use super::scanner::StructuralScanner;
use super::types::{ConflictInfo, ConflictKind, ParsedTestCode};

/// Version suggested when no `V<N>` variant exists yet.
///
/// The unsuffixed original counts as version 1.
pub const FIRST_SUGGESTED_VERSION: u32 = 2;

/// Removes a trailing `V<digits>` marker, if any.
pub fn strip_version(name: &str) -> &str {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return name;
    }
    let stem = &name[..name.len() - digits];
    match stem.strip_suffix('V') {
        Some(base) if !base.is_empty() => base,
        _ => name,
    }
}

/// Next free versioned name for `group` given `existing` content.
pub fn suggest_group_name(group: &str, existing: &str) -> String {
    let base = strip_version(group);
    let pattern = format!(r"\b{}V(\d+)\b", regex::escape(base));

    let highest = Regex::new(&pattern)
        .ok()
        .map(|re| {
            re.captures_iter(existing)
                .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    let version = highest.max(FIRST_SUGGESTED_VERSION - 1).saturating_add(1);
    format!("{}V{}", base, version)
}

/// Finds names in generated code that are already declared in a file.
pub struct ConflictDetector<'a> {
    scanner: &'a dyn StructuralScanner,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(scanner: &'a dyn StructuralScanner) -> Self {
        Self { scanner }
    }

    /// Compares `parsed` against `existing`.
    ///
    /// Only literal declarations count; a name mentioned in a call or a
    /// comment is not a collision.
    pub fn detect(&self, existing: Option<&str>, parsed: &ParsedTestCode) -> ConflictInfo {
        let Some(existing) = existing.filter(|c| !c.trim().is_empty()) else {
            return ConflictInfo::none();
        };
        let lines: Vec<&str> = existing.lines().collect();

        let group_hit = parsed.has_group()
            && self.scanner.find_group(&lines, &parsed.group_name).is_some();

        let method_hits: Vec<String> = parsed
            .method_names()
            .filter(|name| self.scanner.find_method(&lines, name).is_some())
            .map(str::to_string)
            .collect();

        let kind = match (group_hit, !method_hits.is_empty()) {
            (false, false) => return ConflictInfo::none(),
            (true, false) => ConflictKind::Group,
            (false, true) => ConflictKind::Method,
            (true, true) => ConflictKind::Both,
        };

        let mut conflicting_names = Vec::new();
        if group_hit {
            conflicting_names.push(parsed.group_name.clone());
        }
        conflicting_names.extend(method_hits);

        let (suggestion, suggested_group_name) = if group_hit {
            let renamed = suggest_group_name(&parsed.group_name, existing);
            (
                format!(
                    "Test group '{}' already exists. Rename the new group to '{}' or replace the existing one.",
                    parsed.group_name, renamed
                ),
                Some(renamed),
            )
        } else {
            (
                format!(
                    "Test methods already exist: {}. Rename them or replace the existing tests manually.",
                    conflicting_names.join(", ")
                ),
                None,
            )
        };

        debug!(kind = %kind, names = ?conflicting_names, "Naming conflict detected");

        ConflictInfo {
            has_conflict: true,
            conflicting_names,
            suggestion,
            kind: Some(kind),
            suggested_group_name,
        }
    }
}
