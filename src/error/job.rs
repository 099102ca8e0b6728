//! Hard-failure error taxonomy for the generation job client.

use std::time::Duration;

use thiserror::Error;

use super::{
    ClassifiedError, ErrorCategory, FatalReason, RecoveryHint, TimeoutReason, TransientReason,
    UsageLimitReason,
};

/// Errors surfaced by the generation job client.
///
/// None of these are retried internally: submission and each status check
/// fail immediately with the first error observed.
#[derive(Debug, Error)]
pub enum JobError {
    /// The service could not be reached or did not produce a response.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The service answered with a non-2xx status.
    #[error("HTTP {status} from generation service: {body}")]
    HttpError { status: u16, body: String },

    /// The service does not recognise the job id.
    #[error("generation job not found: {0}")]
    NotFound(String),

    /// The service reported failure, or reported completion without a result.
    #[error("generation task failed: {0}")]
    TaskPollingError(String),

    /// The polling deadline passed while the job was still non-terminal.
    #[error("generation task {job_id} timed out after {}ms", elapsed.as_millis())]
    TaskTimeoutError { job_id: String, elapsed: Duration },

    /// A response body could not be mapped onto the expected shape.
    #[error("invalid response from generation service: {0}")]
    InvalidResponse(String),
}

/// Result type for job client operations.
pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    /// Classifies this error into a category and a recovery hint.
    pub fn classify(&self) -> ClassifiedError {
        match self {
            JobError::NetworkError(msg) => ClassifiedError::new(
                ErrorCategory::Transient(TransientReason::NetworkError),
                msg.clone(),
                RecoveryHint::RetryNow,
            ),
            JobError::HttpError { status, body } => {
                classify_http(*status, body).add_context("status", status.to_string())
            }
            JobError::NotFound(job_id) => ClassifiedError::new(
                ErrorCategory::Fatal(FatalReason::ResourceNotFound),
                self.to_string(),
                RecoveryHint::StopExecution,
            )
            .add_context("job_id", job_id.clone()),
            JobError::TaskPollingError(msg) => ClassifiedError::new(
                ErrorCategory::Fatal(FatalReason::GenerationFailed),
                msg.clone(),
                RecoveryHint::WaitForUser,
            ),
            JobError::TaskTimeoutError { job_id, elapsed } => ClassifiedError::new(
                ErrorCategory::Timeout(TimeoutReason::OperationDeadline),
                self.to_string(),
                RecoveryHint::WaitForUser,
            )
            .add_context("job_id", job_id.clone())
            .add_context("elapsed_ms", elapsed.as_millis().to_string()),
            JobError::InvalidResponse(msg) => ClassifiedError::new(
                ErrorCategory::Fatal(FatalReason::ProtocolViolation),
                msg.clone(),
                RecoveryHint::StopExecution,
            ),
        }
    }

    /// Returns true for errors a higher layer may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        self.classify().should_retry()
    }
}

fn classify_http(status: u16, body: &str) -> ClassifiedError {
    let message = format!("HTTP {}: {}", status, body);
    match status {
        429 => ClassifiedError::new(
            ErrorCategory::UsageLimit(UsageLimitReason::RateLimited),
            message,
            RecoveryHint::RetryAfter(Duration::from_secs(60)),
        ),
        503 => ClassifiedError::new(
            ErrorCategory::Transient(TransientReason::ServiceUnavailable),
            message,
            RecoveryHint::RetryAfter(Duration::from_secs(10)),
        ),
        500..=599 => ClassifiedError::new(
            ErrorCategory::Transient(TransientReason::ServerError),
            message,
            RecoveryHint::RetryAfter(Duration::from_secs(5)),
        ),
        401 => ClassifiedError::new(
            ErrorCategory::Fatal(FatalReason::AuthenticationFailed),
            message,
            RecoveryHint::WaitForUser,
        ),
        403 => ClassifiedError::new(
            ErrorCategory::Fatal(FatalReason::PermissionDenied),
            message,
            RecoveryHint::WaitForUser,
        ),
        _ => ClassifiedError::new(
            ErrorCategory::Fatal(FatalReason::InvalidRequest),
            message,
            RecoveryHint::StopExecution,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_transient() {
        let err = JobError::NetworkError("connection refused".to_string());
        let classified = err.classify();
        assert!(classified.is_transient());
        assert!(classified.should_retry());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_http_429_is_usage_limit() {
        let err = JobError::HttpError {
            status: 429,
            body: "slow down".to_string(),
        };
        let classified = err.classify();
        assert!(classified.is_usage_limit());
        assert_eq!(
            classified.recovery_hint,
            RecoveryHint::RetryAfter(Duration::from_secs(60))
        );
        assert_eq!(classified.context.get("status"), Some(&"429".to_string()));
    }

    #[test]
    fn test_http_5xx_is_transient() {
        for status in [500, 502, 503, 504] {
            let err = JobError::HttpError {
                status,
                body: String::new(),
            };
            assert!(err.classify().is_transient(), "status {}", status);
        }
    }

    #[test]
    fn test_http_4xx_is_fatal() {
        for status in [400, 401, 403, 422] {
            let err = JobError::HttpError {
                status,
                body: String::new(),
            };
            assert!(err.classify().is_fatal(), "status {}", status);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_not_found_carries_job_id() {
        let err = JobError::NotFound("job-42".to_string());
        let classified = err.classify();
        assert!(classified.is_fatal());
        assert_eq!(classified.context.get("job_id"), Some(&"job-42".to_string()));
    }

    #[test]
    fn test_timeout_classification() {
        let err = JobError::TaskTimeoutError {
            job_id: "job-1".to_string(),
            elapsed: Duration::from_millis(61_000),
        };
        let classified = err.classify();
        assert!(classified.is_timeout());
        assert!(!classified.should_retry());
        assert_eq!(
            classified.context.get("elapsed_ms"),
            Some(&"61000".to_string())
        );
    }

    #[test]
    fn test_polling_error_message_is_preserved() {
        let err = JobError::TaskPollingError("bad input".to_string());
        assert!(err.to_string().contains("bad input"));
        assert_eq!(err.classify().message, "bad input");
    }

    #[test]
    fn test_display_messages() {
        let err = JobError::HttpError {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 502 from generation service: bad gateway"
        );

        let err = JobError::TaskTimeoutError {
            job_id: "abc".to_string(),
            elapsed: Duration::from_millis(75),
        };
        assert_eq!(err.to_string(), "generation task abc timed out after 75ms");
    }
}
