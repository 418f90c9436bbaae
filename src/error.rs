//! Error types.
//!
//! - `AppError` is what the binary reports: a message plus the process exit code.
//! - `MethodError` describes why one method attempt failed. It is recoverable:
//!   the escalation policy logs it and moves on to the next method.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for bad arguments, configuration, or local file problems.
pub const EXIT_USAGE: u8 = 2;
/// Exit code when every method failed for the point.
pub const EXIT_NO_LIMIT: u8 = 3;
/// Exit code for orchestration failures (spawning, writing the store).
pub const EXIT_RUNTIME: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure of a single method attempt.
#[derive(Debug, Error)]
pub enum MethodError {
    #[error("no converging scan line in tool output")]
    NonConvergence,

    #[error("expected result artifact not found: {0}")]
    MissingArtifact(String),

    #[error("merge into '{}' failed (exit code {code:?})", output.display())]
    MergeFailed { output: PathBuf, code: Option<i32> },

    #[error("tool reported an error in '{label}': {line}")]
    ToolError { label: String, line: String },

    #[error("invocation '{0}' timed out")]
    TimedOut(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for MethodError {
    fn from(err: std::io::Error) -> Self {
        MethodError::Io(err.to_string())
    }
}

impl From<MethodError> for AppError {
    fn from(err: MethodError) -> Self {
        AppError::new(EXIT_RUNTIME, err.to_string())
    }
}
