//! testsplice - fold AI-generated pytest code into an existing test suite
//!
//! Two halves work together:
//!
//! - `client`: submits generation jobs to the external service and long-polls
//!   them with growing delays and a hard deadline
//! - `merge` and `pipeline`: parse the generated text, synthesize imports,
//!   locate the target test file, detect naming conflicts and splice the
//!   code in
//!
//! `context`, `validate` and `format` support the pipeline; `settings`,
//! `logging` and `ui` carry the ambient configuration and terminal output.

pub mod client;
pub mod context;
pub mod error;
pub mod format;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod settings;
pub mod ui;
pub mod validate;
