//! # Snippet Grader
//!
//! Grading helper for an interactive programming-lesson screen. Runs a
//! user-submitted Python snippet in a fresh interpreter process, captures its
//! standard output, optionally feeds it predetermined input, and compares the
//! output against an expected answer to decide pass/fail.
//!
//! Each execution gets its own interpreter process with private stdin/stdout
//! pipes, so concurrent calls never contend over shared streams and the
//! caller's own standard input is never touched.

mod dedent;
mod error;
mod runner;
mod types;

pub use error::Error;
pub use runner::CodeRunner;
pub use types::{ExecutionRequest, ExecutionResult};

/// Result type for grader operations
pub type Result<T> = std::result::Result<T, Error>;
