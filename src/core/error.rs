//! Error types for scheduler operations.

use std::time::Duration;

use thiserror::Error;

use super::job::JobId;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),
    /// A queue store round trip did not complete in time.
    #[error("store operation `{operation}` timed out after {timeout:?}")]
    StoreTimeout {
        /// Name of the store operation.
        operation: &'static str,
        /// Configured bound that elapsed.
        timeout: Duration,
    },
    /// A job's process could not be launched.
    #[error("failed to spawn job {job_id}: {reason}")]
    Spawn {
        /// Job whose command failed to launch.
        job_id: JobId,
        /// Launch error as reported by the OS.
        reason: String,
    },
    /// Shutdown could not return every bound job to pending.
    #[error("{} job(s) could not be released and stay claimed", .jobs.len())]
    Unreleased {
        /// Jobs left in the claimed state.
        jobs: Vec<JobId>,
    },
    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Filesystem or process I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Document (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
