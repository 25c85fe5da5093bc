//! Recorder error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the recording core
///
/// Per-attempt problems (stalls, timeouts, non-zero exits) are not errors;
/// they are reported as [`Verdict`](super::state::Verdict)s and handled by
/// the retry policy.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start capture tool: {0}")]
    SpawnFailed(String),

    #[error("Working directory {} already holds segments", .0.display())]
    WorkDirInUse(PathBuf),

    #[error("No valid segments recorded")]
    NoValidSegments,

    #[error("Merge failed ({reason}); segments preserved in {}", segment_dir.display())]
    MergeFailed { segment_dir: PathBuf, reason: String },
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
