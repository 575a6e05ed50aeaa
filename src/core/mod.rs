//! Core scheduling: jobs, the queue protocol, the process pool, the loop and its drain.

pub mod error;
pub mod job;
pub mod process_pool;
pub mod queue_client;
pub mod scheduler;
pub mod shutdown;
pub mod store;

pub use error::{AppResult, SchedulerError};
pub use job::{FailureRecord, Job, JobId, JobStatus, NewJob};
pub use process_pool::{ProcessExit, ProcessPool, SlotStatus, WorkerSlot, SPAWN_FAILURE_CODE};
pub use queue_client::{QueueClient, Reconciled};
pub use scheduler::{IdleTracker, PassOutcome, Scheduler, SchedulerStats};
pub use shutdown::{
    install_signal_handler, wait_for_shutdown_signal, DrainReport, ShutdownController,
    ShutdownReason,
};
pub use store::JobStore;
