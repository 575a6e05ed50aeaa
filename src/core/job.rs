//! Queue documents and the records derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_secs;

/// Opaque job identifier assigned by the queue store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a store-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue-visible job state. Stored as an integer (`0` pending, `1` claimed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum JobStatus {
    /// Waiting to be claimed.
    Pending,
    /// Owned by a scheduler slot.
    Claimed,
}

impl From<JobStatus> for u8 {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => 0,
            JobStatus::Claimed => 1,
        }
    }
}

impl TryFrom<u8> for JobStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Claimed),
            other => Err(format!("unknown job status {other}")),
        }
    }
}

fn default_directory() -> String {
    ".".into()
}

/// A job document as it lives in the active queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: JobId,
    /// Shell command to execute.
    pub command: String,
    /// Working directory for the command.
    #[serde(default = "default_directory")]
    pub directory: String,
    /// Claim ordering weight, higher first.
    #[serde(default)]
    pub priority: i64,
    /// Current queue state.
    pub status: JobStatus,
    /// Failed executions so far. Informational only.
    #[serde(default)]
    pub attempt_count: u32,
    /// Secondary claim key, ascending, so equal priorities do not run in insertion order.
    #[serde(default, rename = "rand")]
    pub tiebreak: f64,
}

/// A job as submitted by a producer, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    /// Shell command to execute.
    pub command: String,
    /// Working directory for the command.
    pub directory: String,
    /// Claim ordering weight, higher first.
    pub priority: i64,
}

impl NewJob {
    /// Job running `command` in the current directory at priority 0.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            directory: default_directory(),
            priority: 0,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the claim priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Materialize a pending queue document.
    pub fn into_job(self, id: JobId) -> Job {
        Job {
            id,
            command: self.command,
            directory: self.directory,
            priority: self.priority,
            status: JobStatus::Pending,
            attempt_count: 0,
            tiebreak: rand::random::<f64>(),
        }
    }
}

/// Immutable log entry written when a job's process fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Command that was executed.
    pub command: String,
    /// Directory it ran in.
    pub directory: String,
    /// Process exit code (negative for signals, `-1` for launch failures).
    pub return_code: i32,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Priority the job was queued with.
    pub priority: i64,
    /// Identifier of the queue document this record replaces.
    pub original_doc_id: JobId,
    /// Always `"failed"`.
    pub status: String,
    /// Previous attempt count plus one.
    pub attempt_count: u32,
    /// Human-readable failure description.
    pub error_message: String,
}

impl FailureRecord {
    /// Build the record for `job` exiting with `return_code`.
    #[must_use]
    pub fn for_job(job: &Job, return_code: i32, detail: Option<&str>) -> Self {
        let error_message = detail.map_or_else(
            || format!("Process failed with return code {return_code}"),
            |d| format!("Process failed with return code {return_code}: {d}"),
        );
        Self {
            command: job.command.clone(),
            directory: job.directory.clone(),
            return_code,
            timestamp: now_secs(),
            priority: job.priority,
            original_doc_id: job.id.clone(),
            status: "failed".into(),
            attempt_count: job.attempt_count + 1,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&JobStatus::Pending).unwrap(), "0");
        assert_eq!(serde_json::to_string(&JobStatus::Claimed).unwrap(), "1");
        assert!(serde_json::from_str::<JobStatus>("7").is_err());
    }

    #[test]
    fn test_optional_fields_default() {
        let job: Job =
            serde_json::from_str(r#"{"_id":"a1","command":"true","status":0}"#).unwrap();
        assert_eq!(job.directory, ".");
        assert_eq!(job.priority, 0);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_failure_record_increments_attempts() {
        let mut job = NewJob::new("exit 3")
            .with_directory("/tmp")
            .with_priority(4)
            .into_job(JobId::new("j"));
        job.attempt_count = 2;

        let record = FailureRecord::for_job(&job, 3, None);
        assert_eq!(record.attempt_count, 3);
        assert_eq!(record.return_code, 3);
        assert_eq!(record.status, "failed");
        assert_eq!(record.original_doc_id, JobId::new("j"));
        assert_eq!(record.error_message, "Process failed with return code 3");
    }

    #[test]
    fn test_new_job_tiebreak_in_unit_range() {
        let job = NewJob::new("true").into_job(JobId::generate());
        assert!((0.0..1.0).contains(&job.tiebreak));
    }
}
