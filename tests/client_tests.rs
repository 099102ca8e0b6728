//! Integration tests for the generation job client over real HTTP.
//!
//! Each test starts a scripted axum server on an ephemeral port and points
//! `HttpGenerationService` at it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use testsplice::client::{
    GenerationRequest, HttpGenerationService, JobClient, JobStatus, PollOptions, RequestContext,
    TargetMode,
};
use testsplice::error::JobError;
use testsplice::settings::ServiceConfig;

/// Scripted status responses, consumed one per status check. The last one
/// repeats once the script runs out.
#[derive(Clone)]
struct Script {
    replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
    last: Arc<Mutex<Option<(StatusCode, Value)>>>,
    submitted: Arc<Mutex<Vec<Value>>>,
    polls: Arc<Mutex<usize>>,
}

impl Script {
    fn new(replies: Vec<(StatusCode, Value)>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            last: Arc::new(Mutex::new(None)),
            submitted: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(Mutex::new(0)),
        }
    }

    fn next(&self) -> (StatusCode, Value) {
        *self.polls.lock().unwrap() += 1;
        let mut replies = self.replies.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        match replies.pop_front() {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({}))),
        }
    }
}

async fn submit(State(script): State<Script>, Json(body): Json<Value>) -> Response {
    script.submitted.lock().unwrap().push(body);
    Json(json!({
        "task_id": "job-42",
        "status": "pending",
        "estimated_time_seconds": 1.5
    }))
    .into_response()
}

async fn status(State(script): State<Script>, Path(id): Path<String>) -> Response {
    let (code, mut body) = script.next();
    if let Some(obj) = body.as_object_mut() {
        obj.entry("task_id").or_insert(json!(id));
    }
    (code, Json(body)).into_response()
}

async fn serve(script: Script) -> String {
    let app = Router::new()
        .route("/api/generate", post(submit))
        .route("/api/tasks/{id}", get(status))
        .with_state(script);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: String) -> JobClient<HttpGenerationService> {
    let service = HttpGenerationService::new(&ServiceConfig {
        base_url,
        request_timeout_secs: 5,
    })
    .unwrap();
    JobClient::new(service)
}

fn request() -> GenerationRequest {
    GenerationRequest {
        source_code: "def add(a, b):\n    return a + b\n".to_string(),
        user_description: Some("cover negatives".to_string()),
        existing_test_code: None,
        context: RequestContext {
            mode: TargetMode::Function,
            target_function: Some("add".to_string()),
        },
    }
}

fn fast() -> PollOptions {
    PollOptions::new()
        .with_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_millis(1000))
}

fn status_reply(status: &str) -> (StatusCode, Value) {
    (StatusCode::OK, json!({ "status": status }))
}

// ============================================================================
// Successful jobs
// ============================================================================

#[tokio::test]
async fn test_job_completes_after_several_checks() {
    let script = Script::new(vec![
        status_reply("pending"),
        status_reply("pending"),
        status_reply("processing"),
        (
            StatusCode::OK,
            json!({
                "status": "completed",
                "result": { "generated_code": "def test_add():\n    assert add(1, 2) == 3\n" }
            }),
        ),
    ]);
    let base = serve(script.clone()).await;
    let client = client(base);

    let mut seen = Vec::new();
    let started = Instant::now();
    let result = client
        .generate(&request(), |p| seen.push((p.attempt, p.status)), &fast())
        .await
        .unwrap();

    assert!(result.generated_code.contains("def test_add"));
    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(
        seen,
        vec![
            (1, JobStatus::Pending),
            (2, JobStatus::Pending),
            (3, JobStatus::Processing),
            (4, JobStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_submission_body_matches_wire_format() {
    let script = Script::new(vec![(
        StatusCode::OK,
        json!({ "status": "completed", "result": { "generated_code": "x = 1" } }),
    )]);
    let base = serve(script.clone()).await;

    client(base)
        .generate(&request(), |_| {}, &fast())
        .await
        .unwrap();

    let submitted = script.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let body = &submitted[0];
    assert_eq!(body["context"]["mode"], "function");
    assert_eq!(body["context"]["target_function"], "add");
    assert_eq!(body["user_description"], "cover negatives");
    assert!(body.get("existing_test_code").is_none());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_job_that_never_finishes_times_out() {
    let script = Script::new(vec![status_reply("processing")]);
    let base = serve(script.clone()).await;

    let options = PollOptions::new()
        .with_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_millis(50));
    let mut checks = Vec::new();
    let started = Instant::now();
    let err = client(base)
        .generate(&request(), |p| checks.push(p.attempt), &options)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, JobError::TaskTimeoutError { ref job_id, .. } if job_id == "job-42"));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(1000));

    // Delays of 10, 15, 22.5ms and then the clamped remainder fit at most
    // five checks into 50ms; none happens once the deadline has passed.
    assert!(!checks.is_empty() && checks.len() <= 5);
    assert_eq!(checks, (1..=checks.len() as u32).collect::<Vec<_>>());
    assert_eq!(*script.polls.lock().unwrap(), checks.len());
}

#[tokio::test]
async fn test_failed_job_carries_service_message() {
    let script = Script::new(vec![
        status_reply("processing"),
        (
            StatusCode::OK,
            json!({ "status": "failed", "error": { "message": "bad input" } }),
        ),
    ]);
    let base = serve(script).await;

    let err = client(base)
        .generate(&request(), |_| {}, &fast())
        .await
        .unwrap_err();

    match err {
        JobError::TaskPollingError(message) => assert!(message.contains("bad input")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_job_without_message_uses_fallback() {
    let script = Script::new(vec![(StatusCode::OK, json!({ "status": "failed" }))]);
    let base = serve(script).await;

    let err = client(base)
        .generate(&request(), |_| {}, &fast())
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::TaskPollingError(ref m) if m == "Unknown error"));
}

#[tokio::test]
async fn test_server_error_surfaces_immediately() {
    let script = Script::new(vec![(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "detail": "boom" }),
    )]);
    let base = serve(script).await;

    let mut checks = 0;
    let err = client(base)
        .generate(&request(), |_| checks += 1, &fast())
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::HttpError { status: 500, .. }));
    assert_eq!(checks, 0);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let script = Script::new(vec![(StatusCode::NOT_FOUND, json!({ "detail": "no such task" }))]);
    let base = serve(script).await;

    let err = client(base).poll_once("missing").await.unwrap_err();
    assert!(matches!(err, JobError::NotFound(ref id) if id == "missing"));
}

#[tokio::test]
async fn test_completed_without_result_is_error() {
    let script = Script::new(vec![(StatusCode::OK, json!({ "status": "completed" }))]);
    let base = serve(script).await;

    let err = client(base)
        .generate(&request(), |_| {}, &fast())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::TaskPollingError(_)));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_jobs_poll_independently() {
    let script = Script::new(vec![
        status_reply("processing"),
        status_reply("processing"),
        (
            StatusCode::OK,
            json!({ "status": "completed", "result": { "generated_code": "x = 1" } }),
        ),
    ]);
    let base = serve(script).await;
    let client = client(base);
    let options = fast();
    let req = request();

    let (a, b) = tokio::join!(
        client.generate(&req, |_| {}, &options),
        client.generate(&req, |_| {}, &options)
    );

    assert_eq!(a.unwrap().generated_code, "x = 1");
    assert_eq!(b.unwrap().generated_code, "x = 1");
}
