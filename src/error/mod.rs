//! Error types and classification for the generation job client.
//!
//! `JobError` is the hard-failure taxonomy of the async job client. Every
//! variant can be classified into an actionable category with a recovery
//! hint, so that a higher layer can decide on retry policy. Nothing in this
//! crate retries on its own.

pub mod classification;
pub mod job;

pub use classification::{
    ClassifiedError, ErrorCategory, FatalReason, RecoveryHint, TimeoutReason, TransientReason,
    UsageLimitReason,
};
pub use job::{JobError, JobResult};
