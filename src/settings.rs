//! Layered configuration for testsplice.
//!
//! Settings come from an optional `testsplice.toml` in the project root,
//! overridden by `TESTSPLICE__<SECTION>__<KEY>` environment variables.
//! Every field has a default, so an empty or missing file is valid.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::format::Formatter;

/// Name of the per-project configuration file.
pub const CONFIG_FILE_NAME: &str = "testsplice.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TESTSPLICE";

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An explicitly requested configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ConfigError),

    /// The configuration file path is not valid UTF-8.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Generation service connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the generation service.
    pub base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Long-poll timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Initial delay between status checks.
    pub interval_ms: u64,
    /// Total polling budget.
    pub timeout_ms: u64,
    /// Ceiling for the growing delay.
    pub max_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1500,
            timeout_ms: 60_000,
            max_interval_ms: 5000,
        }
    }
}

/// Test directory conventions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Conventional test directory names, checked in order at the project root.
    pub test_dirs: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            test_dirs: vec![
                "tests".to_string(),
                "test".to_string(),
                "__tests__".to_string(),
            ],
        }
    }
}

/// Template assembly toggles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Emit a header comment naming the source file.
    pub include_header: bool,
    /// Replaces the generated header when set.
    pub custom_header: Option<String>,
    /// Append the review-reminder comment block.
    pub add_review_notes: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            include_header: true,
            custom_header: None,
            add_review_notes: false,
        }
    }
}

/// External formatter settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Which formatter to run over generated code.
    pub formatter: Formatter,
    /// Maximum line length passed to the formatter.
    pub line_length: u32,
    /// Return the original code when the formatter is missing or fails.
    pub skip_on_error: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            formatter: Formatter::None,
            line_length: 88,
            skip_on_error: true,
        }
    }
}

/// Root settings structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub polling: PollingConfig,
    pub layout: LayoutConfig,
    pub template: TemplateConfig,
    pub format: FormatConfig,
}

impl Settings {
    /// Load settings from an explicit file path plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or
    /// holds out-of-range values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| SettingsError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(SettingsError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `testsplice.toml` from the project root if it exists, falling
    /// back to defaults, then apply environment overrides.
    pub fn discover(root: &Path) -> Result<Self, SettingsError> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            return Self::load(path);
        }

        let config = Config::builder().add_source(env_source()).build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.service.base_url.trim().is_empty() {
            return Err(SettingsError::Invalid("service.base_url is empty".into()));
        }
        if self.polling.interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "polling.interval_ms must be positive".into(),
            ));
        }
        if self.polling.max_interval_ms < self.polling.interval_ms {
            return Err(SettingsError::Invalid(format!(
                "polling.max_interval_ms ({}) is below polling.interval_ms ({})",
                self.polling.max_interval_ms, self.polling.interval_ms
            )));
        }
        if self.layout.test_dirs.iter().any(|d| d.trim().is_empty()) {
            return Err(SettingsError::Invalid(
                "layout.test_dirs contains an empty name".into(),
            ));
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
