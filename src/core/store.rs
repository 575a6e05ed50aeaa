//! Queue store abstraction.
//!
//! The store owns three collections: the active queue, completed-work records and
//! failure log records. Each method is one independent round trip; the store gives
//! no transactions across calls, only an atomic claim.

use async_trait::async_trait;

use super::error::SchedulerError;
use super::job::{FailureRecord, Job, JobId, JobStatus, NewJob};

/// Abstraction for queue store backends.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically pick the next pending job (priority descending, random key
    /// ascending), mark it claimed and return it.
    async fn claim_next(&self) -> Result<Option<Job>, SchedulerError>;

    /// Read a job from the active queue.
    async fn find(&self, id: &JobId) -> Result<Option<Job>, SchedulerError>;

    /// Remove a job from the active queue. Returns whether it existed.
    async fn delete(&self, id: &JobId) -> Result<bool, SchedulerError>;

    /// Overwrite a job's status, leaving every other field intact.
    /// Returns whether the job existed.
    async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<bool, SchedulerError>;

    /// Append a completed-work record.
    async fn insert_completed(&self, job: &Job) -> Result<(), SchedulerError>;

    /// Append a failure log record.
    async fn insert_failure(&self, record: &FailureRecord) -> Result<(), SchedulerError>;

    /// Insert a new pending job and return its identifier.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, SchedulerError>;

    /// Reset every claimed job back to pending. Returns how many were reset.
    async fn release_all_claimed(&self) -> Result<usize, SchedulerError>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> Result<usize, SchedulerError>;
}

/// Claim order shared by the backends: priority descending, then random key ascending.
pub(crate) fn claim_order(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.tiebreak.total_cmp(&b.tiebreak))
}

/// Index of the job `claim_next` should take from `jobs`, if any is pending.
pub(crate) fn next_claimable(jobs: &[Job]) -> Option<usize> {
    jobs.iter()
        .enumerate()
        .filter(|(_, job)| job.status == JobStatus::Pending)
        .min_by(|(_, a), (_, b)| claim_order(a, b))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, priority: i64, tiebreak: f64, status: JobStatus) -> Job {
        Job {
            id: JobId::new(id),
            command: "true".into(),
            directory: ".".into(),
            priority,
            status,
            attempt_count: 0,
            tiebreak,
        }
    }

    #[test]
    fn test_highest_priority_wins() {
        let jobs = vec![
            job("low", 1, 0.1, JobStatus::Pending),
            job("high", 9, 0.9, JobStatus::Pending),
            job("mid", 5, 0.0, JobStatus::Pending),
        ];
        assert_eq!(next_claimable(&jobs), Some(1));
    }

    #[test]
    fn test_random_key_breaks_ties() {
        let jobs = vec![
            job("first", 5, 0.8, JobStatus::Pending),
            job("second", 5, 0.2, JobStatus::Pending),
        ];
        assert_eq!(next_claimable(&jobs), Some(1));
    }

    #[test]
    fn test_claimed_jobs_are_skipped() {
        let jobs = vec![
            job("taken", 9, 0.0, JobStatus::Claimed),
            job("free", 1, 0.5, JobStatus::Pending),
        ];
        assert_eq!(next_claimable(&jobs), Some(1));
        assert_eq!(next_claimable(&jobs[..1]), None);
    }
}
