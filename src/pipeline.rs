//! Merge pipeline: generated text in, updated test file out.
//!
//! Parser, import synthesis, template assembly, file location, conflict
//! detection and insertion run in that order. Decisions that need a human
//! (naming conflicts, the final preview) go through `DecisionHandler`.
//!
//! The pipeline reads the target once and writes it once, without locking.
//! Runs against the same target path must be serialized by the caller.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::context::SourceContext;
use crate::format::{format_code, FormatError};
use crate::merge::imports::{missing_from, synthesize};
use crate::merge::template::{assemble, TemplateOptions};
use crate::merge::{
    ConflictDetector, ConflictInfo, FileLocator, IndentScanner, InsertError, InsertMode,
    InsertResult, InsertionEngine, ResponseParser, TestFileInfo,
};
use crate::settings::{FormatConfig, Settings};
use crate::validate::{validate, ValidationReport};

/// Answer to a naming conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Swap the existing group for the generated one.
    Replace,
    /// Append next to the existing names.
    AppendAnyway,
    Cancel,
}

/// Answer to the final preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewDecision {
    Insert,
    /// Insert this code instead of the previewed code.
    Edit(String),
    Cancel,
}

/// What is about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub path: PathBuf,
    pub mode: InsertMode,
    pub code: String,
    pub conflict: Option<ConflictInfo>,
    pub warnings: Vec<String>,
}

/// Caller-side decisions the pipeline blocks on.
pub trait DecisionHandler {
    fn on_conflict(&mut self, conflict: &ConflictInfo) -> ConflictDecision;

    fn on_preview(&mut self, preview: &Preview) -> PreviewDecision;
}

/// Decisions fixed up front, for non-interactive runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecisions {
    pub on_conflict: ConflictDecision,
}

impl Default for FixedDecisions {
    fn default() -> Self {
        Self {
            on_conflict: ConflictDecision::Cancel,
        }
    }
}

impl DecisionHandler for FixedDecisions {
    fn on_conflict(&mut self, _conflict: &ConflictInfo) -> ConflictDecision {
        self.on_conflict
    }

    fn on_preview(&mut self, _preview: &Preview) -> PreviewDecision {
        PreviewDecision::Insert
    }
}

/// Where a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    Conflict,
    Preview,
}

/// Final state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatus {
    Inserted(InsertResult),
    Cancelled(CancelPoint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub status: MergeStatus,
    pub target: PathBuf,
    pub conflict: Option<ConflictInfo>,
    pub validation: ValidationReport,
    /// Degradations and lint findings worth showing to a human.
    pub warnings: Vec<String>,
    /// True when no test group or method was recognised in the response.
    pub parse_ambiguous: bool,
}

impl PipelineOutcome {
    /// The insertion result, when the run got that far.
    pub fn inserted(&self) -> Option<&InsertResult> {
        match &self.status {
            MergeStatus::Inserted(result) => Some(result),
            MergeStatus::Cancelled(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("generated response contains no code")]
    EmptyResponse,

    #[error(transparent)]
    Filesystem(#[from] InsertError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// One merge request.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source_path: PathBuf,
    pub context: SourceContext,
    /// Raw generation-service output.
    pub response: String,
}

/// Configured merge pipeline.
pub struct Pipeline {
    root: PathBuf,
    locator: FileLocator,
    template: TemplateOptions,
    format: FormatConfig,
    scanner: IndentScanner,
}

impl Pipeline {
    pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        let root = root.into();
        Self {
            locator: FileLocator::from_config(root.clone(), &settings.layout),
            template: TemplateOptions::from(&settings.template),
            format: settings.format.clone(),
            scanner: IndentScanner::new(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locator(&self) -> &FileLocator {
        &self.locator
    }

    /// Runs the whole merge for `request`.
    pub fn run(
        &self,
        request: &PipelineRequest,
        decisions: &mut dyn DecisionHandler,
    ) -> Result<PipelineOutcome, PipelineError> {
        let parsed = ResponseParser::new(&self.scanner).parse(&request.response);
        if parsed.raw_code.trim().is_empty() {
            return Err(PipelineError::EmptyResponse);
        }

        let mut warnings = Vec::new();
        if parsed.is_ambiguous() {
            warnings.push(
                "No test group or test methods recognised; inserting the raw code".to_string(),
            );
        }

        let imports = synthesize(&request.context, &parsed);
        let file = self.locator.resolve(&request.source_path)?;

        let conflict = ConflictDetector::new(&self.scanner).detect(file.content(), &parsed);
        let conflict = conflict.has_conflict.then_some(conflict);

        let mode = if !file.has_content {
            InsertMode::CreateNewFile
        } else if let Some(info) = &conflict {
            warn!(names = ?info.conflicting_names, "Generated names already exist in target");
            let decision = decisions.on_conflict(info);
            match decision {
                ConflictDecision::Replace => InsertMode::ReplaceGroup,
                ConflictDecision::AppendAnyway => InsertMode::Append,
                ConflictDecision::Cancel => {
                    info!(path = %file.path.display(), "Merge cancelled at conflict");
                    return Ok(PipelineOutcome {
                        status: MergeStatus::Cancelled(CancelPoint::Conflict),
                        target: file.path,
                        conflict,
                        validation: validate(&parsed.raw_code),
                        warnings,
                        parse_ambiguous: parsed.is_ambiguous(),
                    });
                }
            }
        } else {
            InsertMode::Append
        };

        let code = self.build_code(
            request,
            &file,
            mode,
            &imports,
            &parsed.raw_code,
            &mut warnings,
        );
        let formatted = format_code(&code, &self.format)?;
        warnings.extend(formatted.warning.clone());
        let mut code = formatted.code;

        let preview = Preview {
            path: file.path.clone(),
            mode,
            code: code.clone(),
            conflict: conflict.clone(),
            warnings: warnings.clone(),
        };
        match decisions.on_preview(&preview) {
            PreviewDecision::Insert => {}
            PreviewDecision::Edit(edited) => code = edited,
            PreviewDecision::Cancel => {
                info!(path = %file.path.display(), "Merge cancelled at preview");
                return Ok(PipelineOutcome {
                    status: MergeStatus::Cancelled(CancelPoint::Preview),
                    target: file.path,
                    conflict,
                    validation: validate(&code),
                    warnings,
                    parse_ambiguous: parsed.is_ambiguous(),
                });
            }
        }

        let validation = validate(&code);
        warnings.extend(
            validation
                .warnings
                .iter()
                .map(|d| format!("line {}: {}", d.line, d.message)),
        );

        let result = InsertionEngine::new(&self.scanner).insert(&file, &code, mode);
        if result.applied_mode != mode {
            warnings.push(result.message.clone());
        }

        Ok(PipelineOutcome {
            status: MergeStatus::Inserted(result),
            target: file.path,
            conflict,
            validation,
            warnings,
            parse_ambiguous: parsed.is_ambiguous(),
        })
    }

    fn build_code(
        &self,
        request: &PipelineRequest,
        file: &TestFileInfo,
        mode: InsertMode,
        imports: &[String],
        body: &str,
        warnings: &mut Vec<String>,
    ) -> String {
        let Some(existing) = file.content() else {
            return assemble(&request.source_path, &self.root, imports, body, &self.template);
        };

        let missing = missing_from(imports, existing);
        if missing.is_empty() {
            return format!("{}\n", body.trim_end());
        }

        if mode == InsertMode::ReplaceGroup {
            let names: Vec<&str> = missing
                .iter()
                .map(String::as_str)
                .filter(|l| !l.is_empty())
                .collect();
            warnings.push(format!(
                "Imports not added when replacing a group: {}",
                names.join("; ")
            ));
            return format!("{}\n", body.trim_end());
        }

        format!("{}\n\n\n{}\n", missing.join("\n"), body.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Selector;
    use std::fs;
    use tempfile::TempDir;

    const SOURCE: &str = "def add(a, b):\n    return a + b\n";

    struct Recorder {
        conflict: ConflictDecision,
        preview: PreviewDecision,
        conflicts_seen: usize,
        previews: Vec<Preview>,
    }

    impl Recorder {
        fn new(conflict: ConflictDecision, preview: PreviewDecision) -> Self {
            Self {
                conflict,
                preview,
                conflicts_seen: 0,
                previews: Vec::new(),
            }
        }
    }

    impl DecisionHandler for Recorder {
        fn on_conflict(&mut self, _conflict: &ConflictInfo) -> ConflictDecision {
            self.conflicts_seen += 1;
            self.conflict
        }

        fn on_preview(&mut self, preview: &Preview) -> PreviewDecision {
            self.previews.push(preview.clone());
            self.preview.clone()
        }
    }

    fn setup() -> (TempDir, Pipeline, PipelineRequest) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        let source_path = dir.path().join("src/calc.py");
        fs::write(&source_path, SOURCE).unwrap();

        let context = SourceContext::analyze(
            dir.path(),
            &source_path,
            SOURCE,
            &Selector::Function("add".into()),
        )
        .unwrap();
        let pipeline = Pipeline::new(dir.path(), &Settings::default());
        let request = PipelineRequest {
            source_path,
            context,
            response: "```python\nimport pytest\n\nclass TestAdd:\n    def test_add(self):\n        assert add(1, 2) == 3\n```".to_string(),
        };
        (dir, pipeline, request)
    }

    #[test]
    fn test_new_file_gets_full_template() {
        let (dir, pipeline, request) = setup();
        let mut decisions = Recorder::new(ConflictDecision::Cancel, PreviewDecision::Insert);

        let outcome = pipeline.run(&request, &mut decisions).unwrap();
        let result = outcome.inserted().unwrap();

        assert!(result.success);
        assert_eq!(result.applied_mode, InsertMode::CreateNewFile);
        assert_eq!(decisions.conflicts_seen, 0);
        let written = fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();
        assert!(written.starts_with("# Tests for src/calc.py\n\nimport pytest\n\nfrom src.calc import add\n\n\nclass TestAdd:"));
    }

    #[test]
    fn test_conflict_cancel_leaves_file_untouched() {
        let (dir, pipeline, request) = setup();
        let target = dir.path().join("tests/test_calc.py");
        let existing = "import pytest\n\nclass TestAdd:\n    def test_old(self):\n        pass\n";
        fs::write(&target, existing).unwrap();

        let mut decisions = Recorder::new(ConflictDecision::Cancel, PreviewDecision::Insert);
        let outcome = pipeline.run(&request, &mut decisions).unwrap();

        assert_eq!(outcome.status, MergeStatus::Cancelled(CancelPoint::Conflict));
        assert!(outcome.conflict.unwrap().has_conflict);
        assert!(decisions.previews.is_empty());
        assert_eq!(fs::read_to_string(&target).unwrap(), existing);
    }

    #[test]
    fn test_conflict_replace_swaps_group() {
        let (dir, pipeline, request) = setup();
        let target = dir.path().join("tests/test_calc.py");
        fs::write(
            &target,
            "import pytest\nfrom src.calc import add\n\n\nclass TestAdd:\n    def test_old(self):\n        pass\n",
        )
        .unwrap();

        let mut decisions = Recorder::new(ConflictDecision::Replace, PreviewDecision::Insert);
        let outcome = pipeline.run(&request, &mut decisions).unwrap();

        assert_eq!(decisions.previews[0].mode, InsertMode::ReplaceGroup);
        let written = fs::read_to_string(&target).unwrap();
        assert!(!written.contains("test_old"));
        assert!(written.contains("assert add(1, 2) == 3"));
        assert!(written.starts_with("import pytest\nfrom src.calc import add\n\n\nclass TestAdd:"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_append_drops_present_imports() {
        let (dir, pipeline, request) = setup();
        let target = dir.path().join("tests/test_calc.py");
        fs::write(&target, "import pytest\n\n\ndef test_other():\n    pass\n").unwrap();

        let mut decisions = Recorder::new(ConflictDecision::Cancel, PreviewDecision::Insert);
        let outcome = pipeline.run(&request, &mut decisions).unwrap();

        let result = outcome.inserted().unwrap();
        assert_eq!(result.applied_mode, InsertMode::Append);
        let written = fs::read_to_string(&target).unwrap();
        assert_eq!(written.matches("import pytest").count(), 1);
        assert!(written.contains("from src.calc import add\n\n\nclass TestAdd:"));
        assert!(written.starts_with("import pytest\n\n\ndef test_other():\n    pass\n\n\n"));
    }

    #[test]
    fn test_preview_edit_replaces_code() {
        let (dir, pipeline, request) = setup();
        let mut decisions = Recorder::new(
            ConflictDecision::Cancel,
            PreviewDecision::Edit("def test_edited():\n    assert True\n".to_string()),
        );
        pipeline.run(&request, &mut decisions).unwrap();

        let written = fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();
        assert_eq!(written, "def test_edited():\n    assert True\n");
    }

    #[test]
    fn test_preview_cancel() {
        let (dir, pipeline, request) = setup();
        let mut decisions = Recorder::new(ConflictDecision::Cancel, PreviewDecision::Cancel);
        let outcome = pipeline.run(&request, &mut decisions).unwrap();

        assert_eq!(outcome.status, MergeStatus::Cancelled(CancelPoint::Preview));
        assert!(!dir.path().join("tests/test_calc.py").exists());
    }

    #[test]
    fn test_ambiguous_response_still_inserted() {
        let (dir, pipeline, mut request) = setup();
        request.response = "```python\nresult = add(2, 2)\nassert result == 4\n```".to_string();

        let mut decisions = FixedDecisions::default();
        let outcome = pipeline.run(&request, &mut decisions).unwrap();

        assert!(outcome.parse_ambiguous);
        assert!(!outcome.warnings.is_empty());
        let written = fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();
        assert!(written.contains("assert result == 4"));
    }

    #[test]
    fn test_empty_response_is_error() {
        let (_dir, pipeline, mut request) = setup();
        request.response = "```python\nimport pytest\n```".to_string();
        let err = pipeline
            .run(&request, &mut FixedDecisions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResponse));
    }
}
