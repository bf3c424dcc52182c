//! Tracker error types.

use fault_outbox::OutboxError;
use thiserror::Error;

/// Tracker error type.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// init called twice without destroy
    #[error("Fault tracker is already initialized")]
    AlreadyInitialized,

    /// No delivery endpoint configured
    #[error("reportUrl is not configured")]
    MissingReportUrl,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbox error
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// Result type alias using TrackerError.
pub type TrackerResult<T> = Result<T, TrackerError>;
