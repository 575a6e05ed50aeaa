//! MongoDB-backed job store.
//!
//! Works against the `experiments` database with its `queue`, `completed` and `log`
//! collections. Claims are a single `find_one_and_update` over pending documents,
//! sorted by priority descending then `rand` ascending, so concurrent runners never
//! share a job.
//!
//! Producers usually let the server assign `ObjectId` ids. The runner carries them as
//! hex strings and turns them back into `ObjectId`s for every filter.

use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};
use tracing::debug;

use crate::core::{FailureRecord, Job, JobId, JobStatus, JobStore, NewJob, SchedulerError};

const DATABASE: &str = "experiments";
const QUEUE: &str = "queue";
const COMPLETED: &str = "completed";
const LOG: &str = "log";

/// Store backed by a MongoDB deployment.
#[derive(Clone)]
pub struct MongoStore {
    queue: Collection<Document>,
    completed: Collection<Document>,
    log: Collection<Document>,
}

impl MongoStore {
    /// Connect using a `mongodb://` or `mongodb+srv://` connection string.
    ///
    /// The driver connects lazily; an unreachable server shows up on the first call.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Store` if the connection string is invalid.
    pub async fn connect(uri: &str) -> Result<Self, SchedulerError> {
        let client = Client::with_uri_str(uri).await.map_err(store_error)?;
        Ok(Self::with_client(&client))
    }

    /// Use the job collections of an existing client.
    #[must_use]
    pub fn with_client(client: &Client) -> Self {
        let db = client.database(DATABASE);
        Self {
            queue: db.collection(QUEUE),
            completed: db.collection(COMPLETED),
            log: db.collection(LOG),
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn store_error(e: mongodb::error::Error) -> SchedulerError {
    SchedulerError::Store(e.to_string())
}

fn claim_filter() -> Document {
    doc! { "status": i32::from(u8::from(JobStatus::Pending)) }
}

fn claim_sort() -> Document {
    doc! { "priority": -1, "rand": 1 }
}

fn status_update(status: JobStatus) -> Document {
    doc! { "$set": { "status": i32::from(u8::from(status)) } }
}

fn id_to_bson(id: &JobId) -> Bson {
    ObjectId::parse_str(id.as_str()).map_or_else(|_| Bson::String(id.to_string()), Bson::ObjectId)
}

/// Match `id` whether the producer stored it as an `ObjectId` or as a plain string.
fn id_filter(id: &JobId) -> Document {
    match ObjectId::parse_str(id.as_str()) {
        Ok(oid) => doc! { "_id": { "$in": [oid, id.as_str()] } },
        Err(_) => doc! { "_id": id.as_str() },
    }
}

fn id_from_bson(value: &Bson) -> Option<JobId> {
    match value {
        Bson::ObjectId(oid) => Some(JobId::new(oid.to_hex())),
        Bson::String(s) => Some(JobId::new(s.clone())),
        Bson::Int32(n) => Some(JobId::new(n.to_string())),
        Bson::Int64(n) => Some(JobId::new(n.to_string())),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integer(value: Option<&Bson>) -> Option<i64> {
    match value? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn float(value: Option<&Bson>) -> Option<f64> {
    match value? {
        Bson::Double(f) => Some(*f),
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        _ => None,
    }
}

/// Read a queue document. Only `_id` and `command` are required; numeric fields
/// accept any BSON number.
fn job_from_document(doc: &Document) -> Result<Job, SchedulerError> {
    let id = doc
        .get("_id")
        .and_then(id_from_bson)
        .ok_or_else(|| SchedulerError::Store("queue document without a usable _id".into()))?;
    let command = doc
        .get_str("command")
        .map_err(|e| SchedulerError::Store(format!("queue document {id}: {e}")))?
        .to_owned();
    let status = match integer(doc.get("status")) {
        None | Some(0) => JobStatus::Pending,
        Some(_) => JobStatus::Claimed,
    };
    Ok(Job {
        command,
        directory: doc.get_str("directory").unwrap_or(".").to_owned(),
        priority: integer(doc.get("priority")).unwrap_or(0),
        status,
        attempt_count: integer(doc.get("attempt_count"))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        tiebreak: float(doc.get("rand")).unwrap_or(0.0),
        id,
    })
}

fn job_to_document(job: &Job) -> Document {
    doc! {
        "_id": id_to_bson(&job.id),
        "command": job.command.as_str(),
        "directory": job.directory.as_str(),
        "priority": job.priority,
        "status": i32::from(u8::from(job.status)),
        "attempt_count": i64::from(job.attempt_count),
        "rand": job.tiebreak,
    }
}

fn failure_to_document(record: &FailureRecord) -> Result<Document, SchedulerError> {
    let mut doc = mongodb::bson::to_document(record)
        .map_err(|e| SchedulerError::Store(format!("failure record: {e}")))?;
    doc.insert("original_doc_id", id_to_bson(&record.original_doc_id));
    Ok(doc)
}

fn count(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[async_trait]
impl JobStore for MongoStore {
    async fn claim_next(&self) -> Result<Option<Job>, SchedulerError> {
        let claimed = self
            .queue
            .find_one_and_update(claim_filter(), status_update(JobStatus::Claimed))
            .sort(claim_sort())
            .return_document(ReturnDocument::After)
            .await
            .map_err(store_error)?;
        claimed.as_ref().map(job_from_document).transpose()
    }

    async fn find(&self, id: &JobId) -> Result<Option<Job>, SchedulerError> {
        let found = self.queue.find_one(id_filter(id)).await.map_err(store_error)?;
        found.as_ref().map(job_from_document).transpose()
    }

    async fn delete(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let result = self
            .queue
            .delete_one(id_filter(id))
            .await
            .map_err(store_error)?;
        Ok(result.deleted_count > 0)
    }

    async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<bool, SchedulerError> {
        let result = self
            .queue
            .update_one(id_filter(id), status_update(status))
            .await
            .map_err(store_error)?;
        Ok(result.matched_count > 0)
    }

    /// Copies the queue document as stored, extra producer fields included. Falls
    /// back to the parsed job if the document is already gone.
    async fn insert_completed(&self, job: &Job) -> Result<(), SchedulerError> {
        let stored = self
            .queue
            .find_one(id_filter(&job.id))
            .await
            .map_err(store_error)?;
        let doc = stored.unwrap_or_else(|| job_to_document(job));
        self.completed.insert_one(doc).await.map_err(store_error)?;
        Ok(())
    }

    async fn insert_failure(&self, record: &FailureRecord) -> Result<(), SchedulerError> {
        self.log
            .insert_one(failure_to_document(record)?)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn enqueue(&self, job: NewJob) -> Result<JobId, SchedulerError> {
        let mut doc = job_to_document(&job.into_job(JobId::new(String::new())));
        doc.remove("_id");
        let inserted = self.queue.insert_one(doc).await.map_err(store_error)?;
        let id = id_from_bson(&inserted.inserted_id)
            .ok_or_else(|| SchedulerError::Store("server returned an unusable _id".into()))?;
        debug!(job_id = %id, "job enqueued");
        Ok(id)
    }

    async fn release_all_claimed(&self) -> Result<usize, SchedulerError> {
        let result = self
            .queue
            .update_many(
                doc! { "status": i32::from(u8::from(JobStatus::Claimed)) },
                status_update(JobStatus::Pending),
            )
            .await
            .map_err(store_error)?;
        Ok(count(result.modified_count))
    }

    async fn pending_count(&self) -> Result<usize, SchedulerError> {
        let n = self
            .queue
            .count_documents(claim_filter())
            .await
            .map_err(store_error)?;
        Ok(count(n))
    }
}
