//! File-backed job store using JSON lines.
//!
//! A store directory holds three files, one per collection:
//!
//! - `queue.jsonl`: active queue documents
//! - `completed.jsonl`: completed-work records (append only)
//! - `log.jsonl`: failure log records (append only)
//!
//! Every operation holds an exclusive advisory lock on `queue.lock` for its whole
//! read-modify-write, so several processes (a running scheduler and `submit`, say)
//! can share one directory. Queue rewrites go through a uniquely named temp file and
//! a rename. The file I/O runs on Tokio's blocking pool so a slow disk cannot stall
//! the scheduler loop past its store timeout.
//!
//! Queue lines that do not parse as a job are never claimed. They are kept verbatim
//! across rewrites and reported once per line.

use std::collections::HashSet;
use std::fs::{create_dir_all, remove_file, rename, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::core::store::next_claimable;
use crate::core::{FailureRecord, Job, JobId, JobStatus, JobStore, NewJob, SchedulerError};

const QUEUE_FILE: &str = "queue.jsonl";
const COMPLETED_FILE: &str = "completed.jsonl";
const LOG_FILE: &str = "log.jsonl";
const LOCK_FILE: &str = "queue.lock";

/// File-backed store rooted at a directory. Clones share one handle.
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<StoreDir>,
}

struct StoreDir {
    root: PathBuf,
    lock: Mutex<()>,
    reported: Mutex<HashSet<String>>,
}

/// Parsed queue file: claimable jobs plus lines kept as-is.
#[derive(Default)]
struct QueueFile {
    jobs: Vec<Job>,
    unreadable: Vec<String>,
}

impl FileStore {
    /// Open (creating if needed) a store directory.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Io` if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let root = root.as_ref().to_path_buf();
        create_dir_all(&root)?;
        Ok(Self {
            inner: Arc::new(StoreDir {
                root,
                lock: Mutex::new(()),
                reported: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Directory backing this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Read every completed-work record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or holds a malformed line.
    pub fn completed(&self) -> Result<Vec<Job>, SchedulerError> {
        self.inner
            .locked(|dir| read_lines(&dir.root.join(COMPLETED_FILE)))
    }

    /// Read every failure log record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or holds a malformed line.
    pub fn failures(&self) -> Result<Vec<FailureRecord>, SchedulerError> {
        self.inner.locked(|dir| read_lines(&dir.root.join(LOG_FILE)))
    }

    /// Read the claimable part of the active queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be read.
    pub fn queued(&self) -> Result<Vec<Job>, SchedulerError> {
        self.inner.locked(|dir| Ok(dir.load_queue()?.jobs))
    }

    /// Run `f` against the directory on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&StoreDir) -> Result<T, SchedulerError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| SchedulerError::Store(format!("file store task failed: {e}")))?
    }
}

impl StoreDir {
    /// Hold the in-process mutex and the cross-process file lock while `f` runs.
    fn locked<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, SchedulerError>,
    ) -> Result<T, SchedulerError> {
        let _guard = self.lock.lock();
        let handle = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        let mut file_lock = fd_lock::RwLock::new(handle);
        let _held = file_lock.write()?;
        f(self)
    }

    fn load_queue(&self) -> Result<QueueFile, SchedulerError> {
        let path = self.root.join(QUEUE_FILE);
        let mut queue = QueueFile::default();
        let Some(file) = open_if_exists(&path)? else {
            return Ok(queue);
        };
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Job>(&line) {
                Ok(job) => queue.jobs.push(job),
                Err(e) => {
                    if self.reported.lock().insert(line.clone()) {
                        warn!(error = %e, document = %line, "unreadable queue document, it will not be claimed");
                    }
                    queue.unreadable.push(line);
                }
            }
        }
        Ok(queue)
    }

    fn save_queue(&self, queue: &QueueFile) -> Result<(), SchedulerError> {
        let target = self.root.join(QUEUE_FILE);
        let tmp = self
            .root
            .join(format!("{QUEUE_FILE}.{}.tmp", uuid::Uuid::new_v4().simple()));
        let written = write_queue(&tmp, queue)
            .and_then(|()| rename(&tmp, &target).map_err(SchedulerError::from));
        if written.is_err() {
            if let Err(e) = remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %e, "temp queue file not removed");
            }
        }
        written
    }

    /// Load the queue, let `f` mutate its jobs, and persist only if `f` reports a change.
    fn update_queue<T>(
        &self,
        f: impl FnOnce(&mut Vec<Job>) -> (T, bool),
    ) -> Result<T, SchedulerError> {
        self.locked(|dir| {
            let mut queue = dir.load_queue()?;
            let (out, changed) = f(&mut queue.jobs);
            if changed {
                dir.save_queue(&queue)?;
            }
            Ok(out)
        })
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<(), SchedulerError> {
        let line = serde_json::to_string(record)?;
        self.locked(|dir| {
            let mut handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.root.join(file))?;
            writeln!(handle, "{line}")?;
            Ok(())
        })
    }
}

fn write_queue(path: &Path, queue: &QueueFile) -> Result<(), SchedulerError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    for job in &queue.jobs {
        serde_json::to_writer(&mut writer, job)?;
        writer.write_all(b"\n")?;
    }
    for line in &queue.unreadable {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn open_if_exists(path: &Path) -> Result<Option<File>, SchedulerError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SchedulerError> {
    let Some(file) = open_if_exists(path)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

#[async_trait]
impl JobStore for FileStore {
    async fn claim_next(&self) -> Result<Option<Job>, SchedulerError> {
        self.blocking(|dir| {
            dir.update_queue(|jobs| match next_claimable(jobs) {
                Some(idx) => {
                    jobs[idx].status = JobStatus::Claimed;
                    (Some(jobs[idx].clone()), true)
                }
                None => (None, false),
            })
        })
        .await
    }

    async fn find(&self, id: &JobId) -> Result<Option<Job>, SchedulerError> {
        let id = id.clone();
        self.blocking(move |dir| {
            dir.locked(|dir| Ok(dir.load_queue()?.jobs.into_iter().find(|j| j.id == id)))
        })
        .await
    }

    async fn delete(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let id = id.clone();
        self.blocking(move |dir| {
            dir.update_queue(|jobs| {
                let before = jobs.len();
                jobs.retain(|j| j.id != id);
                let removed = jobs.len() != before;
                (removed, removed)
            })
        })
        .await
    }

    async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<bool, SchedulerError> {
        let id = id.clone();
        self.blocking(move |dir| {
            dir.update_queue(|jobs| match jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => {
                    job.status = status;
                    (true, true)
                }
                None => (false, false),
            })
        })
        .await
    }

    async fn insert_completed(&self, job: &Job) -> Result<(), SchedulerError> {
        let job = job.clone();
        self.blocking(move |dir| dir.append(COMPLETED_FILE, &job))
            .await
    }

    async fn insert_failure(&self, record: &FailureRecord) -> Result<(), SchedulerError> {
        let record = record.clone();
        self.blocking(move |dir| dir.append(LOG_FILE, &record)).await
    }

    async fn enqueue(&self, job: NewJob) -> Result<JobId, SchedulerError> {
        let id = JobId::generate();
        let doc = job.into_job(id.clone());
        self.blocking(move |dir| {
            dir.update_queue(|jobs| {
                jobs.push(doc);
                ((), true)
            })
        })
        .await?;
        Ok(id)
    }

    async fn release_all_claimed(&self) -> Result<usize, SchedulerError> {
        self.blocking(|dir| {
            dir.update_queue(|jobs| {
                let mut released = 0;
                for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Claimed) {
                    job.status = JobStatus::Pending;
                    released += 1;
                }
                (released, released > 0)
            })
        })
        .await
    }

    async fn pending_count(&self) -> Result<usize, SchedulerError> {
        self.blocking(|dir| {
            dir.locked(|dir| {
                Ok(dir
                    .load_queue()?
                    .jobs
                    .iter()
                    .filter(|j| j.status == JobStatus::Pending)
                    .count())
            })
        })
        .await
    }
}
