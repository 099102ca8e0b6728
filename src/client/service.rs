//! Generation service seam and its HTTP implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{GenerationRequest, PollResponse, SubmitResponse};
use crate::error::{JobError, JobResult};
use crate::settings::ServiceConfig;

/// Path of the submission endpoint, relative to the base URL.
pub const SUBMIT_PATH: &str = "/api/generate";

/// Path prefix of the status endpoint, relative to the base URL.
pub const TASKS_PATH: &str = "/api/tasks";

/// An asynchronous test-generation backend.
///
/// Implementations surface failures immediately and never retry.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submit a generation request, returning the service's acknowledgement.
    async fn submit(&self, request: &GenerationRequest) -> JobResult<SubmitResponse>;

    /// Perform a single status check for `job_id`.
    async fn poll_once(&self, job_id: &str) -> JobResult<PollResponse>;
}

/// `GenerationService` over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    client: Client,
    base_url: String,
}

impl HttpGenerationService {
    /// Create a service client from connection settings.
    pub fn new(config: &ServiceConfig) -> JobResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| JobError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The normalized base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn task_url(&self, job_id: &str) -> String {
        format!("{}{}/{}", self.base_url, TASKS_PATH, job_id)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn submit(&self, request: &GenerationRequest) -> JobResult<SubmitResponse> {
        let url = format!("{}{}", self.base_url, SUBMIT_PATH);
        debug!(%url, "Submitting generation request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| JobError::NetworkError(format!("HTTP request failed: {}", e)))?;

        let submitted: SubmitResponse = read_json(response).await?;
        if submitted.task_id.trim().is_empty() {
            return Err(JobError::InvalidResponse(
                "submission response has an empty task_id".to_string(),
            ));
        }
        Ok(submitted)
    }

    async fn poll_once(&self, job_id: &str) -> JobResult<PollResponse> {
        let url = self.task_url(job_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| JobError::NetworkError(format!("HTTP request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(JobError::NotFound(job_id.to_string()));
        }

        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> JobResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| JobError::NetworkError(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(JobError::HttpError {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| JobError::InvalidResponse(format!("Failed to parse response: {}", e)))
}
