//! Diagnostic logging for the `testsplice` binary.
//!
//! Logs go to stderr so stdout stays reserved for reports. `RUST_LOG`
//! overrides the verbosity flags entirely. Without it, only this crate's
//! events are raised to the requested level; dependencies stay at `warn`.

use tracing_subscriber::{fmt, EnvFilter};

/// Log level for this crate's events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    /// Default: only degradations and failures
    #[default]
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<u8> for LogLevel {
    /// Maps a `-v` count: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    /// Include the module path of each event.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            with_timestamps: false,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Config for a `-v` count. Debug and above also show module paths.
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = LogLevel::from(verbosity);
        Self::default()
            .with_level(level)
            .with_target(verbosity >= 2)
            .with_timestamps(verbosity >= 2)
    }

    /// Filter directives used when `RUST_LOG` is not set.
    pub fn filter_directives(&self) -> String {
        match self.level {
            LogLevel::Off => "off".to_string(),
            level => format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level.directive()),
        }
    }
}

/// Installs the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.filter_directives())
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    let _ = if config.with_timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };
}
