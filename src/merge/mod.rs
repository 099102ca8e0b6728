//! Text-merge engine for generated tests.
//!
//! Stages, leaves first:
//!
//! - `parser`: pulls code, imports and test names out of a response
//! - `imports` and `template`: build the text of a new test file
//! - `locator`: decides where the test file lives
//! - `conflict`: finds names that already exist in that file
//! - `insert`: creates, appends to, or splices into the file
//!
//! All structural heuristics go through `scanner::StructuralScanner`.

pub mod conflict;
pub mod imports;
pub mod insert;
pub mod locator;
pub mod parser;
pub mod scanner;
pub mod template;
pub mod types;

pub use conflict::{suggest_group_name, ConflictDetector};
pub use imports::{group_imports, synthesize};
pub use insert::{InsertionEngine, Splice};
pub use locator::{test_file_name, FileLocator};
pub use parser::{extract_code, ResponseParser};
pub use scanner::{BoundaryRule, IndentScanner, StructuralScanner};
pub use template::{assemble, TemplateOptions};
pub use types::{
    ConflictInfo, ConflictKind, InsertError, InsertMode, InsertResult, LayoutConvention,
    ParsedTestCode, TestFileInfo, TestMethod,
};
