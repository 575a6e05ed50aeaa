//! # Prometheus Job Runner
//!
//! A local job runner that drains a shared, externally hosted priority queue into
//! OS processes, one per CPU core.
//!
//! The runner keeps a fixed table of worker slots sized from the detected core count.
//! A single cooperative loop walks the slots: finished processes are reconciled back
//! into the queue store, and free slots claim the next pending job. Claims are atomic
//! at the store, so a job is never owned by two slots at once.
//!
//! ## Job Lifecycle
//!
//! - **Pending**: created by a producer, waiting in the queue
//! - **Claimed**: atomically taken by the runner and bound to a slot
//! - **Completed**: exit code 0; the document moves to the completed collection
//! - **Failed**: non-zero exit or launch failure; a log record is written and the
//!   document leaves the queue
//! - **Released**: on shutdown, claimed jobs go back to pending so no work is lost
//!
//! ## Shutdown
//!
//! SIGINT/SIGTERM, or a run of idle passes, ends the loop. The drain terminates every
//! child (SIGTERM to its process group, SIGKILL after the grace period) and releases
//! every bound job.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_job_runner::config::RunnerConfig;
//! use prometheus_job_runner::core::{install_signal_handler, QueueClient, Scheduler};
//! use prometheus_job_runner::infra::InMemoryStore;
//!
//! let config = RunnerConfig::default();
//! let store = Arc::new(InMemoryStore::new());
//! let queue = QueueClient::new(store, config.store_timeout());
//! let mut scheduler = Scheduler::new(&config, queue);
//! install_signal_handler(scheduler.shutdown_token());
//! let report = scheduler.run().await;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: jobs, queue protocol, process pool and loop.
pub mod core;
/// Configuration models for the runner and its store connection.
pub mod config;
/// Builders to construct runner components from configuration.
pub mod builders;
/// Infrastructure adapters for queue store backends.
pub mod infra;
/// Shared utilities.
pub mod util;
