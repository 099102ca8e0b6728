//! Wire types for the generation service and the client-side job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a generation job as reported by the service.
///
/// Statuses only move forward: pending -> processing -> completed/failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet started
    Pending,
    /// Generation in progress
    Processing,
    /// Generation finished with a result
    Completed,
    /// Generation failed on the service side
    Failed,
}

impl JobStatus {
    /// Returns true once no further transition can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What kind of target the generation request is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// A free function
    Function,
    /// A method of a class
    Method,
    /// The whole source file
    File,
}

/// Target description sent along with the source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub mode: TargetMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_function: Option<String>,
}

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub source_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_test_code: Option<String>,
    pub context: RequestContext,
}

/// Response body for `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub estimated_time_seconds: Option<f64>,
}

/// Payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenerationResult {
    pub generated_code: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Error payload of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ServiceError {
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body for `GET /api/tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollResponse {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<GenerationResult>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

impl PollResponse {
    /// The service-reported failure message, if any non-blank one was sent.
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

/// Client-side record of one generation job.
///
/// Lives for the duration of one poll loop. It is abandoned, never
/// cancelled on the service, when the client gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub result: Option<GenerationResult>,
    pub error_message: Option<String>,
}

impl GenerationJob {
    /// Creates a job record in the given initial status.
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            submitted_at: Utc::now(),
            result: None,
            error_message: None,
        }
    }

    /// Moves the job to `next` unless that would revert its status.
    ///
    /// Returns true if the status changed. A terminal job never changes.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            if next != self.status {
                tracing::warn!(
                    job_id = %self.id,
                    current = %self.status,
                    reported = %next,
                    "Ignoring backwards status transition"
                );
            }
            return false;
        }
        let changed = next != self.status;
        self.status = next;
        changed
    }

    /// Returns true once the job reached completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records the payload of a completed job.
    pub fn complete(&mut self, result: GenerationResult) {
        self.advance(JobStatus::Completed);
        self.result = Some(result);
    }

    /// Records why the job failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.advance(JobStatus::Failed);
        self.error_message = Some(message.into());
    }
}
