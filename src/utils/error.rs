//! Error handling for clipfetch

use thiserror::Error;

/// Main error type for clipfetch
#[derive(Debug, Error)]
pub enum ClipfetchError {
    #[error("Extraction backend failed: {0}")]
    BackendExtraction(String),

    #[error("No artifact found: {0}")]
    ArtifactNotFound(String),

    #[error("Process exited with status {exit_code:?}: {stderr_tail}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Process exceeded its deadline of {0:?}")]
    ProcessTimedOut(std::time::Duration),

    #[error("{0} not found. Install it or pass --tool-dir")]
    ToolUnavailable(String),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
