//! In-memory job store for development and testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::store::next_claimable;
use crate::core::{FailureRecord, Job, JobId, JobStatus, JobStore, NewJob, SchedulerError};

#[derive(Default)]
struct Collections {
    queue: Vec<Job>,
    completed: Vec<Job>,
    log: Vec<FailureRecord>,
}

/// In-memory store holding the queue, completed and log collections.
///
/// A single mutex guards all three, which makes `claim_next` atomic.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Collections>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed document, bypassing id and random key assignment.
    pub fn insert_raw(&self, job: Job) {
        self.inner.lock().queue.push(job);
    }

    /// Snapshot of the active queue.
    #[must_use]
    pub fn queued(&self) -> Vec<Job> {
        self.inner.lock().queue.clone()
    }

    /// Snapshot of completed-work records.
    #[must_use]
    pub fn completed(&self) -> Vec<Job> {
        self.inner.lock().completed.clone()
    }

    /// Snapshot of failure log records.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.inner.lock().log.clone()
    }

    /// Current queue document for `id`.
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.inner.lock().queue.iter().find(|j| &j.id == id).cloned()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn claim_next(&self) -> Result<Option<Job>, SchedulerError> {
        let mut inner = self.inner.lock();
        let Some(idx) = next_claimable(&inner.queue) else {
            return Ok(None);
        };
        let job = &mut inner.queue[idx];
        job.status = JobStatus::Claimed;
        Ok(Some(job.clone()))
    }

    async fn find(&self, id: &JobId) -> Result<Option<Job>, SchedulerError> {
        Ok(self.get(id))
    }

    async fn delete(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let mut inner = self.inner.lock();
        let before = inner.queue.len();
        inner.queue.retain(|j| &j.id != id);
        Ok(inner.queue.len() != before)
    }

    async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<bool, SchedulerError> {
        let mut inner = self.inner.lock();
        Ok(inner
            .queue
            .iter_mut()
            .find(|j| &j.id == id)
            .map(|job| job.status = status)
            .is_some())
    }

    async fn insert_completed(&self, job: &Job) -> Result<(), SchedulerError> {
        self.inner.lock().completed.push(job.clone());
        Ok(())
    }

    async fn insert_failure(&self, record: &FailureRecord) -> Result<(), SchedulerError> {
        self.inner.lock().log.push(record.clone());
        Ok(())
    }

    async fn enqueue(&self, job: NewJob) -> Result<JobId, SchedulerError> {
        let id = JobId::generate();
        self.inner.lock().queue.push(job.into_job(id.clone()));
        Ok(id)
    }

    async fn release_all_claimed(&self) -> Result<usize, SchedulerError> {
        let mut inner = self.inner.lock();
        let mut released = 0;
        for job in inner.queue.iter_mut().filter(|j| j.status == JobStatus::Claimed) {
            job.status = JobStatus::Pending;
            released += 1;
        }
        Ok(released)
    }

    async fn pending_count(&self) -> Result<usize, SchedulerError> {
        Ok(self
            .inner
            .lock()
            .queue
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_marks_job_claimed_once() {
        let store = InMemoryStore::new();
        let id = store.enqueue(NewJob::new("true")).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::Claimed);
        assert!(store.claim_next().await.unwrap().is_none());
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_priority_order() {
        let store = InMemoryStore::new();
        store.enqueue(NewJob::new("a").with_priority(1)).await.unwrap();
        let high = store.enqueue(NewJob::new("b").with_priority(10)).await.unwrap();
        store.enqueue(NewJob::new("c").with_priority(5)).await.unwrap();

        let first = store.claim_next().await.unwrap().unwrap();
        assert_eq!(first.id, high);
        let second = store.claim_next().await.unwrap().unwrap();
        assert_eq!(second.priority, 5);
        let third = store.claim_next().await.unwrap().unwrap();
        assert_eq!(third.priority, 1);
    }

    #[tokio::test]
    async fn test_set_status_preserves_other_fields() {
        let store = InMemoryStore::new();
        let id = store
            .enqueue(NewJob::new("echo hi").with_directory("/tmp").with_priority(3))
            .await
            .unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();

        assert!(store.set_status(&id, JobStatus::Pending).await.unwrap());
        let after = store.get(&id).unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.command, claimed.command);
        assert_eq!(after.directory, claimed.directory);
        assert_eq!(after.priority, claimed.priority);
        assert!((after.tiebreak - claimed.tiebreak).abs() < f64::EPSILON);

        assert!(!store.set_status(&JobId::new("missing"), JobStatus::Pending).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_all_claimed() {
        let store = InMemoryStore::new();
        store.enqueue(NewJob::new("a")).await.unwrap();
        store.enqueue(NewJob::new("b")).await.unwrap();
        store.enqueue(NewJob::new("c")).await.unwrap();
        store.claim_next().await.unwrap();
        store.claim_next().await.unwrap();

        assert_eq!(store.release_all_claimed().await.unwrap(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = InMemoryStore::new();
        let id = store.enqueue(NewJob::new("a")).await.unwrap();
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }
}
