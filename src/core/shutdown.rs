//! Shutdown signalling and the drain sequence.
//!
//! Drain is the terminal state of a runner. Slots whose process already exited get
//! their outcome recorded as usual; every live process is terminated (gracefully,
//! then forcibly) and its job is returned to pending so a later run can pick it up.
//! Each slot is handled independently; a failure on one does not stop the others.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::error::SchedulerError;
use super::job::JobId;
use super::process_pool::{ProcessPool, SlotStatus};
use super::queue_client::QueueClient;

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal or explicit cancellation.
    Signal,
    /// The queue stayed empty for the configured number of idle passes.
    Idle,
}

/// What the drain did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Trigger for the drain.
    pub reason: ShutdownReason,
    /// Processes that were still running and got terminated.
    pub terminated: usize,
    /// Jobs that had already exited with code 0 and were recorded as completed.
    pub completed: Vec<JobId>,
    /// Jobs that had already failed and were written to the failure log.
    pub failed: Vec<JobId>,
    /// Jobs returned to pending.
    pub released: Vec<JobId>,
    /// Jobs whose release failed; they stay claimed in the store.
    pub release_failures: Vec<JobId>,
}

impl DrainReport {
    fn new(reason: ShutdownReason) -> Self {
        Self {
            reason,
            terminated: 0,
            completed: Vec::new(),
            failed: Vec::new(),
            released: Vec::new(),
            release_failures: Vec::new(),
        }
    }

    /// Whether every bound job made it back to pending.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.release_failures.is_empty()
    }

    /// Turn an unclean drain into an error.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Unreleased` listing the jobs left claimed.
    pub fn ensure_clean(&self) -> Result<(), SchedulerError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(SchedulerError::Unreleased {
                jobs: self.release_failures.clone(),
            })
        }
    }
}

/// Runs the drain sequence.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownController {
    grace: Duration,
}

impl ShutdownController {
    /// Controller giving each process `grace` before a forced kill.
    #[must_use]
    pub const fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Record already finished jobs, terminate every remaining process and release
    /// every job still bound.
    pub async fn drain(
        &self,
        pool: &mut ProcessPool,
        queue: &QueueClient,
        reason: ShutdownReason,
    ) -> DrainReport {
        info!(?reason, active = pool.active_count(), "draining process pool");
        let mut report = DrainReport::new(reason);

        for idx in 0..pool.len() {
            if pool.slot(idx).bound_job().is_none() {
                continue;
            }
            let SlotStatus::Finished(exit) = pool.poll_slot(idx) else {
                continue;
            };
            let Some(id) = pool.take_binding(idx) else {
                continue;
            };
            match queue.reconcile(&id, &exit).await {
                Ok(_) if exit.success() => report.completed.push(id),
                Ok(_) => report.failed.push(id),
                Err(e) => {
                    error!(slot = idx, job_id = %id, error = %e, "outcome not recorded, releasing instead");
                    release(queue, idx, id, &mut report).await;
                }
            }
        }

        for idx in 0..pool.len() {
            if let Some(exit) = pool.terminate(idx, self.grace).await {
                info!(slot = idx, exit_code = exit.code, "process terminated");
                report.terminated += 1;
            }
        }

        for idx in 0..pool.len() {
            if let Some(id) = pool.take_binding(idx) {
                release(queue, idx, id, &mut report).await;
            }
        }

        if report.is_clean() {
            info!(
                terminated = report.terminated,
                completed = report.completed.len(),
                failed = report.failed.len(),
                released = report.released.len(),
                "drain complete"
            );
        } else {
            warn!(
                terminated = report.terminated,
                released = report.released.len(),
                unreleased = report.release_failures.len(),
                "drain finished with unreleased jobs"
            );
        }
        report
    }
}

async fn release(queue: &QueueClient, idx: usize, id: JobId, report: &mut DrainReport) {
    match queue.release_to_pending(&id).await {
        Ok(_) => report.released.push(id),
        Err(e) => {
            error!(slot = idx, job_id = %id, error = %e, "could not release job, it stays claimed");
            report.release_failures.push(id);
        }
    }
}

/// Wait for SIGINT, SIGTERM or SIGQUIT (Ctrl-C elsewhere).
///
/// # Errors
///
/// Returns the I/O error if a signal handler cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigquit.recv() => info!("received SIGQUIT"),
    }
    Ok(())
}

/// Wait for SIGINT, SIGTERM or SIGQUIT (Ctrl-C elsewhere).
///
/// # Errors
///
/// Returns the I/O error if the Ctrl-C handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `token` when a termination signal arrives.
///
/// Must be called from within a Tokio runtime.
pub fn install_signal_handler(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                info!("initiating graceful shutdown");
                token.cancel();
            }
            Err(e) => error!(error = %e, "failed to install signal handlers"),
        }
    })
}
