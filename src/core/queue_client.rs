//! Scheduler-facing view of the queue store.
//!
//! Wraps a [`JobStore`] with a per-call timeout and composes the store's primitive
//! round trips into the claim/complete/fail/release protocol. Reconciliation steps
//! are separate, non-transactional calls; a failure between them leaves an orphan
//! record that is logged and left for external cleanup.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::error::SchedulerError;
use super::job::{FailureRecord, Job, JobId, JobStatus};
use super::process_pool::ProcessExit;
use super::store::JobStore;

/// What a reconcile call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The job was found and its outcome recorded.
    Applied,
    /// The job was no longer in the active queue; nothing changed.
    Missing,
}

/// Client for the scheduler's queue protocol.
#[derive(Clone)]
pub struct QueueClient {
    store: Arc<dyn JobStore>,
    timeout: Duration,
}

impl QueueClient {
    /// Create a client bounding every store call by `timeout`.
    pub fn new(store: Arc<dyn JobStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, SchedulerError>
    where
        F: Future<Output = Result<T, SchedulerError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| SchedulerError::StoreTimeout {
                operation,
                timeout: self.timeout,
            })?
    }

    /// Claim the next pending job.
    ///
    /// Store errors and timeouts are logged and reported as "no job available";
    /// the next scheduler pass retries naturally.
    pub async fn claim_next(&self) -> Option<Job> {
        match self.bounded("claim_next", self.store.claim_next()).await {
            Ok(Some(job)) => {
                info!(job_id = %job.id, priority = job.priority, attempt_count = job.attempt_count, "job claimed");
                Some(job)
            }
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "claim failed, treating queue as empty");
                None
            }
        }
    }

    /// Move a successful job into the completed collection and drop it from the queue.
    ///
    /// # Errors
    ///
    /// Returns the first failing store call; earlier steps are not rolled back.
    pub async fn mark_completed(&self, id: &JobId) -> Result<Reconciled, SchedulerError> {
        let Some(job) = self.bounded("find", self.store.find(id)).await? else {
            warn!(job_id = %id, "completed job no longer queued");
            return Ok(Reconciled::Missing);
        };
        self.bounded("insert_completed", self.store.insert_completed(&job))
            .await?;
        self.remove_after_record(id).await?;
        info!(job_id = %id, "job completed");
        Ok(Reconciled::Applied)
    }

    /// Write a failure log record for a failed job and drop it from the queue.
    ///
    /// # Errors
    ///
    /// Returns the first failing store call; earlier steps are not rolled back.
    pub async fn mark_failed(
        &self,
        id: &JobId,
        exit: &ProcessExit,
    ) -> Result<Reconciled, SchedulerError> {
        let Some(job) = self.bounded("find", self.store.find(id)).await? else {
            warn!(job_id = %id, "failed job no longer queued");
            return Ok(Reconciled::Missing);
        };
        let record = FailureRecord::for_job(&job, exit.code, exit.detail.as_deref());
        self.bounded("insert_failure", self.store.insert_failure(&record))
            .await?;
        self.remove_after_record(id).await?;
        warn!(
            job_id = %id,
            return_code = exit.code,
            attempt_count = record.attempt_count,
            command = %job.command,
            "job failed"
        );
        Ok(Reconciled::Applied)
    }

    /// Record a finished job's outcome: completed on exit code 0, failed otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first failing store call.
    pub async fn reconcile(
        &self,
        id: &JobId,
        exit: &ProcessExit,
    ) -> Result<Reconciled, SchedulerError> {
        if exit.success() {
            self.mark_completed(id).await
        } else {
            self.mark_failed(id, exit).await
        }
    }

    async fn remove_after_record(&self, id: &JobId) -> Result<(), SchedulerError> {
        match self.bounded("delete", self.store.delete(id)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(job_id = %id, error = %e, "outcome recorded but job left in queue");
                Err(e)
            }
        }
    }

    /// Return a claimed job to pending without touching its other fields.
    ///
    /// # Errors
    ///
    /// Returns the store error if the status update fails or times out.
    pub async fn release_to_pending(&self, id: &JobId) -> Result<Reconciled, SchedulerError> {
        let found = self
            .bounded(
                "set_status",
                self.store.set_status(id, JobStatus::Pending),
            )
            .await?;
        if found {
            info!(job_id = %id, "job released to pending");
            Ok(Reconciled::Applied)
        } else {
            warn!(job_id = %id, "released job no longer queued");
            Ok(Reconciled::Missing)
        }
    }

    /// Reset every claimed job to pending. Only safe with no other scheduler running.
    ///
    /// # Errors
    ///
    /// Returns the store error if the update fails or times out.
    pub async fn recover_stale_claims(&self) -> Result<usize, SchedulerError> {
        let released = self
            .bounded("release_all_claimed", self.store.release_all_claimed())
            .await?;
        if released > 0 {
            warn!(released, "stale claims returned to pending");
        }
        Ok(released)
    }
}
