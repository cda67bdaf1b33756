//! Error types.
//!
//! Library modules return small typed errors (`SegmentError`, `SolverError`,
//! `JobError`, `ParameterError`). The binary funnels all of them into
//! [`AppError`], which carries the process exit code.

use std::time::Duration;

use thiserror::Error;

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

/// Precondition failures of segment table operations.
///
/// A failed operation never modifies the table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("segment index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("position {pos} outside domain [{min}, {max}]")]
    PositionOutOfDomain { pos: f64, min: f64, max: f64 },
    #[error("divider {divider} outside segment [{left}, {right}]")]
    DividerOutOfRange { divider: f64, left: f64, right: f64 },
    #[error("cannot delete the last remaining segment")]
    LastSegment,
    #[error("segment count limit ({max}) reached")]
    TooManySegments { max: usize },
    #[error("invalid segment count {count} (expected 1..={max})")]
    InvalidCount { count: usize, max: usize },
    #[error("invalid domain [{min}, {max}]")]
    InvalidDomain { min: f64, max: f64 },
}

/// Failure of one solver invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("solver timed out after {0:?}")]
    Timeout(Duration),
    #[error("lc error: {0}")]
    Failed(String),
    #[error("missing parameter {0}")]
    MissingParameter(String),
}

/// Errors surfaced by the job dispatcher and job handles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("no executor registered for job kind '{0}'")]
    UnknownKind(String),
    #[error("job was canceled")]
    Canceled,
    #[error("job has not finished yet")]
    Pending,
    #[error("worker pool: {0}")]
    Pool(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("unknown parameter '{0}'")]
    Unknown(String),
    #[error("parameter '{name}' expects an {expected} value")]
    WrongType { name: String, expected: &'static str },
}

impl From<SegmentError> for AppError {
    fn from(value: SegmentError) -> Self {
        AppError::new(2, value.to_string())
    }
}

impl From<ParameterError> for AppError {
    fn from(value: ParameterError) -> Self {
        AppError::new(2, value.to_string())
    }
}

impl From<JobError> for AppError {
    fn from(value: JobError) -> Self {
        AppError::new(4, value.to_string())
    }
}

impl From<SolverError> for AppError {
    fn from(value: SolverError) -> Self {
        AppError::new(4, value.to_string())
    }
}
