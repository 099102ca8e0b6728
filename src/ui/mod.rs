//! Terminal output: colors, job spinners and reports.

mod colors;
mod report;
mod spinner;

pub use colors::{Palette, Theme};
pub use report::Report;
pub use spinner::{progress_message, JobSpinner};
