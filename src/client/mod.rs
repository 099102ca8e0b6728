//! Async job client for the external test-generation service.
//!
//! The service works asynchronously: a request is submitted, then its status
//! is polled until it completes or fails. This module provides:
//!
//! - `GenerationService`: the seam over the service (HTTP in production,
//!   scripted mocks in tests)
//! - `JobClient`: submission plus a bounded long-poll loop with growing
//!   delays and a hard deadline
//! - wire types for requests, status responses and the job record

pub mod poll;
pub mod service;
pub mod types;

pub use poll::{next_interval, JobClient, JobProgress, PollOptions, BACKOFF_FACTOR, UNKNOWN_ERROR};
pub use service::{GenerationService, HttpGenerationService, SUBMIT_PATH, TASKS_PATH};
pub use types::{
    GenerationJob, GenerationRequest, GenerationResult, JobStatus, PollResponse, RequestContext,
    ServiceError, SubmitResponse, TargetMode,
};
