//! Error classification types.
//!
//! Errors are classified by category (transient, usage limit, fatal, timeout)
//! and each category has specific reasons and a recovery hint. The job client
//! never acts on these itself; they exist for callers that own retry policy.

use std::collections::HashMap;
use std::time::Duration;

/// The primary category of an error, determining the general recovery strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary errors that may resolve on retry.
    Transient(TransientReason),
    /// Errors due to rate limits or quota exhaustion on the service.
    UsageLimit(UsageLimitReason),
    /// Errors that require user intervention.
    Fatal(FatalReason),
    /// Errors caused by an exceeded deadline.
    Timeout(TimeoutReason),
}

/// Reasons for transient errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransientReason {
    /// No response from the service (DNS, TCP, TLS, dropped connection).
    NetworkError,
    /// Service temporarily unavailable (HTTP 503).
    ServiceUnavailable,
    /// Other server-side failure (HTTP 5xx).
    ServerError,
}

/// Reasons for usage limit errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageLimitReason {
    /// Rate limit exceeded (HTTP 429).
    RateLimited,
}

/// Reasons for fatal errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FatalReason {
    /// Invalid credentials (HTTP 401).
    AuthenticationFailed,
    /// Insufficient permissions (HTTP 403).
    PermissionDenied,
    /// Unknown job id.
    ResourceNotFound,
    /// The request was rejected as malformed (other HTTP 4xx).
    InvalidRequest,
    /// The service reported that generation failed.
    GenerationFailed,
    /// The service answered with a shape that breaks the protocol.
    ProtocolViolation,
}

/// Reasons for timeout errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeoutReason {
    /// The client-side polling deadline passed.
    OperationDeadline,
}

/// Hints for how to recover from an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Retry immediately with the same parameters.
    RetryNow,
    /// Retry after a specified duration.
    RetryAfter(Duration),
    /// Surface to the user before doing anything else.
    WaitForUser,
    /// Stop; retrying cannot help.
    StopExecution,
}

/// A classified error with category, message, recovery hint, and additional context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedError {
    /// The category of the error.
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Suggested recovery action.
    pub recovery_hint: RecoveryHint,
    /// Additional context as key-value pairs.
    pub context: HashMap<String, String>,
}

impl ClassifiedError {
    /// Creates a new classified error.
    pub fn new(
        category: ErrorCategory,
        message: impl Into<String>,
        recovery_hint: RecoveryHint,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            recovery_hint,
            context: HashMap::new(),
        }
    }

    /// Adds a context key-value pair to the error.
    pub fn add_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Returns true if this error is transient and may resolve on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self.category, ErrorCategory::Transient(_))
    }

    /// Returns true if this error is due to usage limits.
    pub fn is_usage_limit(&self) -> bool {
        matches!(self.category, ErrorCategory::UsageLimit(_))
    }

    /// Returns true if this error is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self.category, ErrorCategory::Fatal(_))
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.category, ErrorCategory::Timeout(_))
    }

    /// Returns true if this error suggests retrying.
    pub fn should_retry(&self) -> bool {
        matches!(
            self.recovery_hint,
            RecoveryHint::RetryNow | RecoveryHint::RetryAfter(_)
        )
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ClassifiedError {}
