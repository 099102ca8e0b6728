//! Final file text composition.

use std::path::Path;

use crate::settings::TemplateConfig;

/// Comment block appended when review notes are requested.
pub const REVIEW_NOTES: &[&str] = &[
    "# Review notes:",
    "# - These tests were generated; check every assertion before committing.",
    "# - Add cases for boundary values and error paths the generator missed.",
    "# - Remove tests that duplicate existing coverage.",
];

/// Template switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateOptions {
    pub include_header: bool,
    /// Replaces the generated header line when set.
    pub custom_header: Option<String>,
    pub add_review_notes: bool,
}

impl From<&TemplateConfig> for TemplateOptions {
    fn from(config: &TemplateConfig) -> Self {
        Self {
            include_header: config.include_header,
            custom_header: config.custom_header.clone(),
            add_review_notes: config.add_review_notes,
        }
    }
}

/// Header comment naming the source file relative to `root`.
pub fn header_line(source_path: &Path, root: &Path) -> String {
    let relative = source_path.strip_prefix(root).unwrap_or(source_path);
    let shown: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("# Tests for {}", shown.join("/"))
}

fn comment(text: &str) -> String {
    let text = text.trim();
    if text.starts_with('#') {
        text.to_string()
    } else {
        format!("# {}", text)
    }
}

/// Concatenates header, imports and body into file text.
///
/// Layout: header, blank line, imports, two blank lines, body, then the
/// optional review notes. Sections that are empty are left out together with
/// their separators.
pub fn assemble(
    source_path: &Path,
    root: &Path,
    imports: &[String],
    body: &str,
    options: &TemplateOptions,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if options.include_header {
        let header = match options.custom_header.as_deref() {
            Some(custom) if !custom.trim().is_empty() => comment(custom),
            _ => header_line(source_path, root),
        };
        sections.push(header);
    }

    if !imports.is_empty() {
        sections.push(imports.join("\n"));
    }

    let body = body.trim_matches('\n');
    if !body.trim().is_empty() {
        sections.push(body.to_string());
    }

    if options.add_review_notes {
        sections.push(REVIEW_NOTES.join("\n"));
    }

    let mut out = String::new();
    let mut previous: Option<usize> = None;
    for (index, section) in sections.iter().enumerate() {
        if let Some(prev) = previous {
            // One blank line after the header, two everywhere else.
            let separator = if prev == 0 && options.include_header {
                "\n\n"
            } else {
                "\n\n\n"
            };
            out.push_str(separator);
        }
        out.push_str(section);
        previous = Some(index);
    }
    out.push('\n');
    out
}
