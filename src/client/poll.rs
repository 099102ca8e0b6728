//! Submission and long-poll loop for generation jobs.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::service::GenerationService;
use super::types::{GenerationJob, GenerationRequest, GenerationResult, JobStatus, PollResponse};
use crate::error::{JobError, JobResult};
use crate::settings::PollingConfig;

/// Growth factor applied to the poll interval after every status check.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Fallback message when the service reports failure without one.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Timing for `JobClient::poll_until_complete`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOptions {
    /// Initial delay between status checks. Default: 1500ms
    pub interval: Duration,
    /// Total wall-clock budget for the loop. Default: 60000ms
    pub timeout: Duration,
    /// Ceiling for the growing delay. Default: 5000ms
    pub max_interval: Duration,
    /// Multiplier applied to the delay after every check. Default: 1.5
    pub backoff_factor: f64,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            timeout: Duration::from_millis(60_000),
            max_interval: Duration::from_millis(5000),
            backoff_factor: BACKOFF_FACTOR,
        }
    }
}

impl PollOptions {
    /// Creates poll options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the total timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the interval ceiling.
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Sets the backoff multiplier. Values below 1.0 are treated as 1.0.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            backoff_factor: BACKOFF_FACTOR,
        }
    }
}

/// Computes the delay that follows `current` under the default factor.
pub fn next_interval(current: Duration, max_interval: Duration) -> Duration {
    grow_interval(current, BACKOFF_FACTOR, max_interval)
}

fn grow_interval(current: Duration, factor: f64, max_interval: Duration) -> Duration {
    current.mul_f64(factor).min(max_interval)
}

/// Snapshot handed to the progress callback after every status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub job_id: String,
    pub status: JobStatus,
    /// 1-based number of the status check that produced this snapshot.
    pub attempt: u32,
    pub elapsed: Duration,
}

/// Client for submitting generation jobs and waiting on them.
///
/// Each poll loop owns its own timer, interval and job record, so any number
/// of loops may run concurrently against one client.
#[derive(Debug, Clone)]
pub struct JobClient<S> {
    service: S,
}

impl<S: GenerationService> JobClient<S> {
    /// Wraps a generation service.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Returns the underlying service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submits a request and returns the freshly created job record.
    pub async fn submit(&self, request: &GenerationRequest) -> JobResult<GenerationJob> {
        let response = self.service.submit(request).await?;
        info!(
            job_id = %response.task_id,
            status = %response.status,
            estimated_secs = ?response.estimated_time_seconds,
            "Generation job submitted"
        );
        Ok(GenerationJob::new(response.task_id, response.status))
    }

    /// Performs a single status check.
    pub async fn poll_once(&self, job_id: &str) -> JobResult<PollResponse> {
        self.service.poll_once(job_id).await
    }

    /// Polls `job_id` until it reaches a terminal status or the timeout passes.
    ///
    /// Builds a fresh pending record for the id; use `track` to keep a record
    /// returned by `submit`.
    pub async fn poll_until_complete<F>(
        &self,
        job_id: &str,
        on_progress: F,
        options: &PollOptions,
    ) -> JobResult<GenerationResult>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let mut job = GenerationJob::new(job_id, JobStatus::Pending);
        self.track(&mut job, on_progress, options).await
    }

    /// Polls `job` until it reaches a terminal status or the timeout passes,
    /// recording the outcome on it.
    ///
    /// The elapsed time is checked before every status check; once it exceeds
    /// `options.timeout` the loop fails with `TaskTimeoutError` without a
    /// final check. `on_progress` runs after every status check and is the
    /// only observation point. Giving up does not cancel the job on the
    /// service.
    pub async fn track<F>(
        &self,
        job: &mut GenerationJob,
        mut on_progress: F,
        options: &PollOptions,
    ) -> JobResult<GenerationResult>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let job_id = job.id.clone();
        let started = Instant::now();
        let mut interval = options.interval;
        let mut attempt: u32 = 0;

        loop {
            let elapsed = started.elapsed();
            if elapsed > options.timeout {
                warn!(
                    job_id = %job_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    last_status = %job.status,
                    "Abandoning generation job after timeout"
                );
                return Err(JobError::TaskTimeoutError { job_id, elapsed });
            }

            attempt += 1;
            let response = self.service.poll_once(&job_id).await?;
            job.advance(response.status);

            on_progress(&JobProgress {
                job_id: job_id.clone(),
                status: job.status,
                attempt,
                elapsed: started.elapsed(),
            });

            match job.status {
                JobStatus::Completed => return completed_result(job, response),
                JobStatus::Failed => {
                    let message = response
                        .error_message()
                        .unwrap_or(UNKNOWN_ERROR)
                        .to_string();
                    warn!(job_id = %job_id, %message, "Generation job failed");
                    job.fail(message.clone());
                    return Err(JobError::TaskPollingError(message));
                }
                JobStatus::Pending | JobStatus::Processing => {}
            }

            let remaining = options.timeout.saturating_sub(started.elapsed());
            let delay = interval.min(remaining + Duration::from_millis(1));
            debug!(
                job_id = %job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Job not finished, waiting"
            );
            tokio::time::sleep(delay).await;
            interval = grow_interval(interval, options.backoff_factor, options.max_interval);
        }
    }

    /// Submits `request` and polls it to completion.
    pub async fn generate<F>(
        &self,
        request: &GenerationRequest,
        on_progress: F,
        options: &PollOptions,
    ) -> JobResult<GenerationResult>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let mut job = self.submit(request).await?;
        let outcome = self.track(&mut job, on_progress, options).await;
        debug!(
            job_id = %job.id,
            status = %job.status,
            submitted_at = %job.submitted_at,
            took_ms = (Utc::now() - job.submitted_at).num_milliseconds(),
            error = ?job.error_message,
            "Generation job finished"
        );
        outcome
    }
}

fn completed_result(
    job: &mut GenerationJob,
    response: PollResponse,
) -> JobResult<GenerationResult> {
    match response.result {
        Some(result) if !result.generated_code.trim().is_empty() => {
            info!(
                job_id = %job.id,
                bytes = result.generated_code.len(),
                "Generation job completed"
            );
            job.complete(result.clone());
            Ok(result)
        }
        _ => {
            let message = format!("job {} reported completed without a result", job.id);
            job.error_message = Some(message.clone());
            Err(JobError::TaskPollingError(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::{ServiceError, SubmitResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of poll responses; repeats the last one forever.
    struct ScriptedService {
        script: Mutex<VecDeque<PollResponse>>,
        last: Mutex<Option<PollResponse>>,
        polls: Mutex<u32>,
    }

    impl ScriptedService {
        fn new(statuses: Vec<PollResponse>) -> Self {
            Self {
                script: Mutex::new(statuses.into()),
                last: Mutex::new(None),
                polls: Mutex::new(0),
            }
        }

        fn poll_count(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn submit(&self, _request: &GenerationRequest) -> JobResult<SubmitResponse> {
            Ok(SubmitResponse {
                task_id: "job-1".to_string(),
                status: JobStatus::Pending,
                estimated_time_seconds: Some(1.0),
            })
        }

        async fn poll_once(&self, _job_id: &str) -> JobResult<PollResponse> {
            *self.polls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(response) = next {
                *last = Some(response);
            }
            last.as_ref()
                .cloned()
                .ok_or_else(|| JobError::NotFound("job-1".to_string()))
        }
    }

    fn status(status: JobStatus) -> PollResponse {
        PollResponse {
            task_id: "job-1".to_string(),
            status,
            result: None,
            error: None,
        }
    }

    fn completed(code: &str) -> PollResponse {
        PollResponse {
            result: Some(GenerationResult {
                generated_code: code.to_string(),
                explanation: None,
            }),
            ..status(JobStatus::Completed)
        }
    }

    fn fast() -> PollOptions {
        PollOptions::new()
            .with_interval(Duration::from_millis(1))
            .with_timeout(Duration::from_millis(500))
    }

    #[test]
    fn test_next_interval_grows_and_caps() {
        let max = Duration::from_millis(5000);
        assert_eq!(
            next_interval(Duration::from_millis(1500), max),
            Duration::from_millis(2250)
        );
        assert_eq!(
            next_interval(Duration::from_millis(4000), max),
            Duration::from_millis(5000)
        );
        assert_eq!(next_interval(max, max), max);
    }

    #[test]
    fn test_poll_options_from_config() {
        let options = PollOptions::from(&PollingConfig::default());
        assert_eq!(options, PollOptions::default());
    }

    #[test]
    fn test_submit_creates_pending_job_record() {
        let client = JobClient::new(ScriptedService::new(Vec::new()));
        let request = GenerationRequest {
            source_code: "def f():\n    pass\n".to_string(),
            user_description: None,
            existing_test_code: None,
            context: crate::client::types::RequestContext {
                mode: crate::client::types::TargetMode::File,
                target_function: None,
            },
        };

        let job = tokio_test::block_on(client.submit(&request)).unwrap();
        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());
        assert_eq!(client.service().poll_count(), 0);
    }

    #[tokio::test]
    async fn test_progress_called_after_every_poll() {
        let service = ScriptedService::new(vec![
            status(JobStatus::Pending),
            status(JobStatus::Processing),
            completed("def test_x():\n    assert True\n"),
        ]);
        let client = JobClient::new(service);

        let mut seen = Vec::new();
        let result = client
            .poll_until_complete("job-1", |p| seen.push((p.attempt, p.status)), &fast())
            .await
            .unwrap();

        assert!(result.generated_code.contains("def test_x"));
        assert_eq!(
            seen,
            vec![
                (1, JobStatus::Pending),
                (2, JobStatus::Processing),
                (3, JobStatus::Completed)
            ]
        );
        assert_eq!(client.service().poll_count(), 3);
    }

    #[tokio::test]
    async fn test_completed_without_result_is_polling_error() {
        let client = JobClient::new(ScriptedService::new(vec![status(JobStatus::Completed)]));
        let err = client
            .poll_until_complete("job-1", |_| {}, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::TaskPollingError(_)));
    }

    #[tokio::test]
    async fn test_completed_with_blank_code_is_polling_error() {
        let client = JobClient::new(ScriptedService::new(vec![completed("   \n")]));
        let err = client
            .poll_until_complete("job-1", |_| {}, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::TaskPollingError(_)));
    }

    #[tokio::test]
    async fn test_failed_without_message_uses_default() {
        let client = JobClient::new(ScriptedService::new(vec![PollResponse {
            error: Some(ServiceError { message: None }),
            ..status(JobStatus::Failed)
        }]));
        let err = client
            .poll_until_complete("job-1", |_| {}, &fast())
            .await
            .unwrap_err();
        match err {
            JobError::TaskPollingError(msg) => assert_eq!(msg, UNKNOWN_ERROR),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_error_surfaces_immediately() {
        let client = JobClient::new(ScriptedService::new(vec![]));
        let err = client
            .poll_until_complete("job-1", |_| {}, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
        assert_eq!(client.service().poll_count(), 1);
    }

    #[tokio::test]
    async fn test_track_records_failure_on_job() {
        let client = JobClient::new(ScriptedService::new(vec![
            status(JobStatus::Processing),
            PollResponse {
                error: Some(ServiceError {
                    message: Some("bad input".to_string()),
                }),
                ..status(JobStatus::Failed)
            },
        ]));
        let mut job = GenerationJob::new("job-1", JobStatus::Pending);
        let submitted_at = job.submitted_at;

        let err = client.track(&mut job, |_| {}, &fast()).await.unwrap_err();

        assert!(matches!(err, JobError::TaskPollingError(ref m) if m == "bad input"));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("bad input"));
        assert!(job.result.is_none());
        assert_eq!(job.submitted_at, submitted_at);
    }

    #[tokio::test]
    async fn test_track_records_result_on_job() {
        let client = JobClient::new(ScriptedService::new(vec![completed("def test_b():\n    pass")]));
        let mut job = GenerationJob::new("job-1", JobStatus::Pending);

        let result = client.track(&mut job, |_| {}, &fast()).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_ref(), Some(&result));
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_track_records_missing_result_as_error() {
        let client = JobClient::new(ScriptedService::new(vec![status(JobStatus::Completed)]));
        let mut job = GenerationJob::new("job-1", JobStatus::Pending);

        client.track(&mut job, |_| {}, &fast()).await.unwrap_err();

        assert!(job.result.is_none());
        assert!(job
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("without a result")));
    }

    #[tokio::test]
    async fn test_generate_submits_then_polls() {
        let client = JobClient::new(ScriptedService::new(vec![completed("def test_a():\n    pass")]));
        let request = GenerationRequest {
            source_code: "def a():\n    pass\n".to_string(),
            user_description: None,
            existing_test_code: None,
            context: crate::client::types::RequestContext {
                mode: crate::client::types::TargetMode::Function,
                target_function: Some("a".to_string()),
            },
        };
        let result = client.generate(&request, |_| {}, &fast()).await.unwrap();
        assert!(result.generated_code.starts_with("def test_a"));
    }
}
