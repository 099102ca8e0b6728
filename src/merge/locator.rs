//! Test file placement.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::scanner::METHOD_PREFIX;
use super::types::{InsertError, LayoutConvention, TestFileInfo};
use crate::settings::LayoutConfig;

/// Test file name for a source file.
///
/// `calc.py` becomes `test_calc.py`; names already following the
/// `test_<stem>` or `<stem>_test` convention are kept.
pub fn test_file_name(source_path: &Path) -> String {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if stem.starts_with(METHOD_PREFIX) || stem.ends_with("_test") {
        format!("{}.py", stem)
    } else {
        format!("{}{}.py", METHOD_PREFIX, stem)
    }
}

/// Resolves where the tests for a source file live.
#[derive(Debug, Clone)]
pub struct FileLocator {
    root: PathBuf,
    test_dirs: Vec<String>,
}

impl FileLocator {
    /// Creates a locator that checks `test_dirs` in order under `root`.
    pub fn new(root: impl Into<PathBuf>, test_dirs: Vec<String>) -> Self {
        Self {
            root: root.into(),
            test_dirs,
        }
    }

    /// Creates a locator from the `[layout]` settings.
    pub fn from_config(root: impl Into<PathBuf>, config: &LayoutConfig) -> Self {
        Self::new(root, config.test_dirs.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First conventional test directory that exists under the root.
    pub fn layout(&self) -> LayoutConvention {
        self.test_dirs
            .iter()
            .find(|dir| self.root.join(dir).is_dir())
            .map(|dir| LayoutConvention::TestDirectory(dir.clone()))
            .unwrap_or(LayoutConvention::Colocated)
    }

    /// Path of the test file for `source_path`, without touching it.
    pub fn target_path(&self, source_path: &Path) -> PathBuf {
        let name = test_file_name(source_path);
        match self.layout() {
            LayoutConvention::TestDirectory(dir) => self.root.join(dir).join(name),
            LayoutConvention::Colocated => {
                let source = if source_path.is_absolute() {
                    source_path.to_path_buf()
                } else {
                    self.root.join(source_path)
                };
                source
                    .parent()
                    .map(|parent| parent.join(&name))
                    .unwrap_or_else(|| self.root.join(&name))
            }
        }
    }

    /// Snapshots the test file for `source_path`.
    ///
    /// A missing file is not an error; an unreadable one is.
    pub fn resolve(&self, source_path: &Path) -> Result<TestFileInfo, InsertError> {
        let layout = self.layout();
        let path = self.target_path(source_path);

        let existing_content = if path.is_file() {
            Some(fs::read_to_string(&path).map_err(|e| InsertError::Filesystem {
                path: path.clone(),
                message: e.to_string(),
            })?)
        } else {
            None
        };

        let has_content = existing_content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());

        debug!(
            path = %path.display(),
            layout = %layout,
            exists = existing_content.is_some(),
            has_content,
            "Resolved test file"
        );

        Ok(TestFileInfo {
            exists: existing_content.is_some(),
            has_content,
            existing_content,
            layout,
            path,
        })
    }
}
