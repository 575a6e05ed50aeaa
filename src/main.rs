//! `job-runner`: drain a job queue into local processes, one per CPU core.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use prometheus_job_runner::builders::build_store;
use prometheus_job_runner::config::{read_connection_string, RunnerConfig};
use prometheus_job_runner::core::{
    install_signal_handler, AppResult, JobStore, NewJob, QueueClient, Scheduler,
};
use prometheus_job_runner::util::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "job-runner", version, about)]
struct Cli {
    /// JSON runner configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File holding the store connection string.
    #[arg(long, global = true)]
    connection_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until signalled or idle (default).
    Run {
        /// Slot count; defaults to the number of CPU cores.
        #[arg(long)]
        workers: Option<usize>,
        /// Return claimed jobs to pending before the first pass.
        #[arg(long)]
        recover_stale_claims: bool,
    },
    /// Add a job to the queue.
    Submit {
        /// Claim priority; higher runs first.
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Working directory for the command.
        #[arg(long, default_value = ".")]
        directory: String,
        /// Command line, passed to `sh -c`.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Return every claimed job to pending. Only run while no scheduler is active.
    Recover,
}

fn load_config(cli: &Cli) -> AppResult<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::from_path(path).map_err(anyhow::Error::msg)?,
        None => RunnerConfig::default(),
    };
    config = config.apply_env().map_err(anyhow::Error::msg)?;
    if let Some(path) = &cli.connection_file {
        config.connection_file.clone_from(path);
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    let connection = read_connection_string(&config.connection_file)
        .with_context(|| "store connection string is required")?;
    let store = build_store(&connection)
        .await
        .context("failed to open job store")?;
    let queue = QueueClient::new(store.clone(), config.store_timeout());

    match cli.command.unwrap_or(Command::Run {
        workers: None,
        recover_stale_claims: false,
    }) {
        Command::Run {
            workers,
            recover_stale_claims,
        } => {
            if workers.is_some() {
                config.worker_count = workers;
            }
            config.recover_stale_claims |= recover_stale_claims;
            if let Err(e) = config.validate() {
                bail!("invalid configuration: {e}");
            }

            let mut scheduler = Scheduler::new(&config, queue);
            install_signal_handler(scheduler.shutdown_token());
            let report = scheduler.run().await;
            info!(
                reason = ?report.reason,
                released = report.released.len(),
                unreleased = report.release_failures.len(),
                "job runner exiting"
            );
            report
                .ensure_clean()
                .context("shutdown left jobs claimed in the store")?;
        }
        Command::Submit {
            priority,
            directory,
            command,
        } => {
            let job = NewJob::new(command.join(" "))
                .with_directory(directory)
                .with_priority(priority);
            let id = store.enqueue(job).await.context("failed to submit job")?;
            println!("{id}");
        }
        Command::Recover => {
            let released = queue
                .recover_stale_claims()
                .await
                .context("failed to recover claimed jobs")?;
            println!("{released} job(s) returned to pending");
        }
    }
    Ok(())
}
