//! The scheduling loop.
//!
//! A single cooperative loop walks the slots of a [`ProcessPool`]. For every slot
//! whose process has finished it reconciles the bound job (if any) and then tries to
//! claim new work for that slot. Parallelism comes only from the child processes;
//! the loop owns all of its state and needs no locks.
//!
//! The loop ends either when the shutdown token is cancelled or after a configured
//! number of consecutive fully idle passes, and then hands over to
//! [`ShutdownController::drain`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;

use super::job::JobId;
use super::process_pool::{ProcessExit, ProcessPool, SlotStatus};
use super::queue_client::QueueClient;
use super::shutdown::{DrainReport, ShutdownController, ShutdownReason};

/// Counters over the scheduler's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Full passes over the pool.
    pub passes: u64,
    /// Jobs claimed from the queue.
    pub claimed: u64,
    /// Jobs whose process exited with code 0.
    pub completed: u64,
    /// Jobs whose process failed, including launch failures.
    pub failed: u64,
    /// Jobs whose command could not be launched.
    pub spawn_failures: u64,
    /// Jobs returned to pending at shutdown.
    pub released: u64,
    /// Claims that returned a job this runner was already running.
    pub duplicate_claims: u64,
    /// Highest number of simultaneously bound slots seen.
    pub peak_active: usize,
}

/// Summary of one pass over the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Jobs claimed during the pass.
    pub claimed: usize,
    /// Finished jobs reconciled during the pass.
    pub reconciled: usize,
    /// Slots still bound at the end of the pass.
    pub active: usize,
}

impl PassOutcome {
    /// A pass that claimed nothing and left no slot bound.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.claimed == 0 && self.active == 0
    }
}

/// Counts consecutive fully idle passes.
#[derive(Debug, Clone, Copy)]
pub struct IdleTracker {
    consecutive: u32,
    threshold: u32,
}

impl IdleTracker {
    /// Tracker that trips after `threshold` idle passes in a row.
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold,
        }
    }

    /// Record a pass. Returns `true` once the idle threshold is reached.
    pub fn record(&mut self, outcome: &PassOutcome) -> bool {
        if outcome.is_idle() {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        self.consecutive >= self.threshold
    }

    /// Idle passes in the current streak.
    #[must_use]
    pub const fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Polling scheduler bound to one queue.
pub struct Scheduler {
    queue: QueueClient,
    pool: ProcessPool,
    idle: IdleTracker,
    stats: SchedulerStats,
    shutdown: CancellationToken,
    poll_interval: Duration,
    idle_backoff: Duration,
    grace: Duration,
    recover_stale_claims: bool,
}

impl Scheduler {
    /// Build a scheduler with a pool sized from `config`.
    #[must_use]
    pub fn new(config: &RunnerConfig, queue: QueueClient) -> Self {
        Self {
            queue,
            pool: ProcessPool::initialize(config.resolved_worker_count()),
            idle: IdleTracker::new(config.idle_pass_threshold),
            stats: SchedulerStats::default(),
            shutdown: CancellationToken::new(),
            poll_interval: config.poll_interval(),
            idle_backoff: config.idle_backoff(),
            grace: config.grace_timeout(),
            recover_stale_claims: config.recover_stale_claims,
        }
    }

    /// Token that stops the loop when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Lifetime counters.
    #[must_use]
    pub const fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// The slot table.
    #[must_use]
    pub const fn pool(&self) -> &ProcessPool {
        &self.pool
    }

    /// Run passes until cancelled or idle, then drain.
    pub async fn run(&mut self) -> DrainReport {
        if self.recover_stale_claims {
            if let Err(e) = self.queue.recover_stale_claims().await {
                error!(error = %e, "stale claim recovery failed");
            }
        }
        info!(slots = self.pool.len(), "scheduler started");

        let reason = loop {
            if self.shutdown.is_cancelled() {
                break ShutdownReason::Signal;
            }
            let outcome = self.run_pass().await;
            if self.shutdown.is_cancelled() {
                break ShutdownReason::Signal;
            }

            let mut pause = self.poll_interval;
            if self.idle.record(&outcome) {
                info!(idle_passes = self.idle.consecutive(), "queue idle, shutting down");
                break ShutdownReason::Idle;
            }
            if outcome.is_idle() {
                debug!(idle_passes = self.idle.consecutive(), "idle pass, backing off");
                pause += self.idle_backoff;
            }

            tokio::select! {
                () = self.shutdown.cancelled() => break ShutdownReason::Signal,
                () = tokio::time::sleep(pause) => {}
            }
        };

        self.drain(reason).await
    }

    /// One pass over every slot: reconcile finished work, then claim new work.
    ///
    /// Once the shutdown token is cancelled no further slots are visited.
    pub async fn run_pass(&mut self) -> PassOutcome {
        let mut outcome = PassOutcome::default();

        for idx in 0..self.pool.len() {
            if self.shutdown.is_cancelled() {
                break;
            }
            let SlotStatus::Finished(exit) = self.pool.poll_slot(idx) else {
                continue;
            };
            if let Some(id) = self.pool.take_binding(idx) {
                self.reconcile(idx, &id, &exit).await;
                outcome.reconciled += 1;
            }

            let Some(job) = self.queue.claim_next().await else {
                continue;
            };
            if self.pool.is_tracking(&job.id) {
                // Releasing would let the running job be claimed a second time.
                error!(
                    slot = idx,
                    job_id = %job.id,
                    "store returned a job this runner is already running, leaving its claim in place"
                );
                self.stats.duplicate_claims += 1;
                continue;
            }
            self.stats.claimed += 1;
            outcome.claimed += 1;
            if let Err(e) = self.pool.spawn(idx, &job) {
                warn!(slot = idx, error = %e, "job could not be launched");
                self.stats.spawn_failures += 1;
            }
        }

        outcome.active = self.pool.active_count();
        self.stats.passes += 1;
        self.stats.peak_active = self.stats.peak_active.max(outcome.active);
        debug!(
            claimed = outcome.claimed,
            reconciled = outcome.reconciled,
            active = outcome.active,
            "pass finished"
        );
        outcome
    }

    async fn reconcile(&mut self, idx: usize, id: &JobId, exit: &ProcessExit) {
        if exit.success() {
            self.stats.completed += 1;
        } else {
            self.stats.failed += 1;
        }
        if let Err(e) = self.queue.reconcile(id, exit).await {
            error!(slot = idx, job_id = %id, exit_code = exit.code, error = %e, "reconciliation incomplete");
        }
    }

    /// Record finished jobs, terminate the rest and release their jobs. Terminal:
    /// the pool keeps no bindings afterwards.
    pub async fn drain(&mut self, reason: ShutdownReason) -> DrainReport {
        let report = ShutdownController::new(self.grace)
            .drain(&mut self.pool, &self.queue, reason)
            .await;
        self.stats.completed += report.completed.len() as u64;
        self.stats.failed += report.failed.len() as u64;
        self.stats.released += report.released.len() as u64;
        info!(
            passes = self.stats.passes,
            claimed = self.stats.claimed,
            completed = self.stats.completed,
            failed = self.stats.failed,
            spawn_failures = self.stats.spawn_failures,
            released = self.stats.released,
            duplicate_claims = self.stats.duplicate_claims,
            peak_active = self.stats.peak_active,
            "scheduler stopped"
        );
        report
    }
}
