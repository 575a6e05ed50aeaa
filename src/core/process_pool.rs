//! Fixed-size pool of process slots.
//!
//! Each slot holds at most one child process and the id of the job it was spawned
//! for. Only the scheduler loop touches the pool, so no locking is involved; all
//! mutation goes through the pool's methods.
//!
//! Exit codes follow the shell contract: `0` is success, anything else is failure.
//! A process killed by a signal reports the negated signal number and a command that
//! could not be launched reports [`SPAWN_FAILURE_CODE`].

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::error::SchedulerError;
use super::job::{Job, JobId};

/// Exit code recorded when a job's command could not be launched at all.
pub const SPAWN_FAILURE_CODE: i32 = -1;

/// How a slot's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, negative signal number, or [`SPAWN_FAILURE_CODE`].
    pub code: i32,
    /// Extra context for failures that never produced an exit code.
    pub detail: Option<String>,
}

impl ProcessExit {
    /// Whether the job succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }

    const fn placeholder() -> Self {
        Self {
            code: 0,
            detail: None,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        Self {
            code: exit_code(status),
            detail: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            code: SPAWN_FAILURE_CODE,
            detail: Some(reason.into()),
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    SPAWN_FAILURE_CODE
}

/// Result of a non-blocking slot check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// The slot's process is still executing.
    Running,
    /// The slot's process has exited (or never started).
    Finished(ProcessExit),
}

#[derive(Debug)]
enum ProcessHandle {
    /// Startup stand-in that reports as already finished.
    Placeholder,
    Running(Child),
    Exited(ProcessExit),
}

/// One pool position.
#[derive(Debug)]
pub struct WorkerSlot {
    handle: ProcessHandle,
    bound_job: Option<JobId>,
}

impl WorkerSlot {
    const fn idle() -> Self {
        Self {
            handle: ProcessHandle::Placeholder,
            bound_job: None,
        }
    }

    /// Job currently owned by this slot.
    #[must_use]
    pub const fn bound_job(&self) -> Option<&JobId> {
        self.bound_job.as_ref()
    }

    /// Whether this slot has a live child process.
    #[must_use]
    pub const fn has_process(&self) -> bool {
        matches!(self.handle, ProcessHandle::Running(_))
    }
}

/// Fixed-size array of process slots.
#[derive(Debug)]
pub struct ProcessPool {
    slots: Vec<WorkerSlot>,
}

impl ProcessPool {
    /// Create `size` slots, each holding a finished placeholder so the first
    /// scheduler pass treats every slot as free.
    #[must_use]
    pub fn initialize(size: usize) -> Self {
        info!(slots = size, "process pool initialized");
        Self {
            slots: (0..size).map(|_| WorkerSlot::idle()).collect(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrow slot `idx`.
    #[must_use]
    pub fn slot(&self, idx: usize) -> &WorkerSlot {
        &self.slots[idx]
    }

    /// Number of slots with a bound job.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.bound_job.is_some()).count()
    }

    /// Whether any slot already owns `id`.
    #[must_use]
    pub fn is_tracking(&self, id: &JobId) -> bool {
        self.slots.iter().any(|s| s.bound_job.as_ref() == Some(id))
    }

    /// Non-blocking check of slot `idx`.
    pub fn poll_slot(&mut self, idx: usize) -> SlotStatus {
        let slot = &mut self.slots[idx];
        let exit = match &mut slot.handle {
            ProcessHandle::Placeholder => return SlotStatus::Finished(ProcessExit::placeholder()),
            ProcessHandle::Exited(exit) => return SlotStatus::Finished(exit.clone()),
            ProcessHandle::Running(child) => match child.try_wait() {
                Ok(Some(status)) => ProcessExit::from_status(status),
                Ok(None) => return SlotStatus::Running,
                Err(e) => {
                    warn!(slot = idx, error = %e, "failed to poll child process");
                    ProcessExit::failed(format!("wait failed: {e}"))
                }
            },
        };
        debug!(slot = idx, exit_code = exit.code, "slot process exited");
        slot.handle = ProcessHandle::Exited(exit.clone());
        SlotStatus::Finished(exit)
    }

    /// Clear and return slot `idx`'s binding once its outcome has been reconciled.
    pub fn take_binding(&mut self, idx: usize) -> Option<JobId> {
        self.slots[idx].bound_job.take()
    }

    /// Launch `job` in slot `idx` and bind it.
    ///
    /// A launch failure still binds the job: the slot then reports as finished with
    /// [`SPAWN_FAILURE_CODE`] so the job is reconciled like any other failed run.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Spawn` if the command could not be started.
    pub fn spawn(&mut self, idx: usize, job: &Job) -> Result<(), SchedulerError> {
        let slot = &mut self.slots[idx];
        debug_assert!(slot.bound_job.is_none(), "slot {idx} rebound before reconcile");
        slot.bound_job = Some(job.id.clone());

        match shell_command(job).spawn() {
            Ok(child) => {
                info!(slot = idx, job_id = %job.id, pid = ?child.id(), directory = %job.directory, command = %job.command, "job started");
                slot.handle = ProcessHandle::Running(child);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                slot.handle = ProcessHandle::Exited(ProcessExit::failed(reason.clone()));
                Err(SchedulerError::Spawn {
                    job_id: job.id.clone(),
                    reason,
                })
            }
        }
    }

    /// Stop slot `idx`'s process: ask politely, then kill after `grace`.
    ///
    /// Returns the exit observed, or `None` if no process was running.
    pub async fn terminate(&mut self, idx: usize, grace: Duration) -> Option<ProcessExit> {
        let slot = &mut self.slots[idx];
        let ProcessHandle::Running(child) = &mut slot.handle else {
            return None;
        };

        request_stop(child);
        let exit = match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => ProcessExit::from_status(status),
            Ok(Err(e)) => ProcessExit::failed(format!("wait failed: {e}")),
            Err(_) => {
                warn!(slot = idx, ?grace, "process ignored termination request, killing");
                force_kill(child);
                match child.wait().await {
                    Ok(status) => ProcessExit::from_status(status),
                    Err(e) => ProcessExit::failed(format!("wait failed: {e}")),
                }
            }
        };
        slot.handle = ProcessHandle::Exited(exit.clone());
        Some(exit)
    }
}

fn shell_command(job: &Job) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&job.command)
        .current_dir(&job.directory)
        .stdin(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

#[cfg(unix)]
fn signal_group(child: &mut Child, signal: nix::sys::signal::Signal) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, ?signal, error = %e, "killpg failed");
            false
        }
    }
}

fn kill_child(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(pid = ?child.id(), error = %e, "start_kill failed");
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    if !signal_group(child, nix::sys::signal::Signal::SIGTERM) {
        kill_child(child);
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    kill_child(child);
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    signal_group(child, nix::sys::signal::Signal::SIGKILL);
    kill_child(child);
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    kill_child(child);
}
