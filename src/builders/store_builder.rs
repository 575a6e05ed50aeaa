//! Build a job store from a connection string.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::core::{JobStore, SchedulerError};
use crate::infra::store::{FileStore, InMemoryStore, MongoStore};

/// Store backend named by a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// `memory://`: process-local, lost on exit.
    InMemory,
    /// `file://<dir>` or a bare path: JSON-lines collections in a directory.
    File(PathBuf),
    /// `mongodb://` or `mongodb+srv://`: the full connection string, credentials included.
    Mongo(String),
}

impl StoreTarget {
    /// Parse a connection string.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` for unknown schemes or an empty path.
    pub fn parse(connection: &str) -> Result<Self, SchedulerError> {
        let connection = connection.trim();
        if connection == "memory://" || connection == "memory" {
            return Ok(Self::InMemory);
        }
        if let Some(path) = connection.strip_prefix("file://") {
            return Self::file(path);
        }
        if connection.starts_with("mongodb://") || connection.starts_with("mongodb+srv://") {
            return Ok(Self::Mongo(connection.to_owned()));
        }
        if let Some((scheme, _)) = connection.split_once("://") {
            return Err(SchedulerError::Config(format!(
                "unsupported store scheme `{scheme}`"
            )));
        }
        Self::file(connection)
    }

    fn file(path: &str) -> Result<Self, SchedulerError> {
        if path.is_empty() {
            return Err(SchedulerError::Config("store path is empty".into()));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

/// Open the store a connection string points at.
///
/// # Errors
///
/// Returns a configuration error for a bad connection string, or the backend's
/// error if it cannot be opened.
pub async fn build_store(connection: &str) -> Result<Arc<dyn JobStore>, SchedulerError> {
    match StoreTarget::parse(connection)? {
        StoreTarget::InMemory => {
            info!("using in-memory job store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreTarget::File(root) => {
            info!(root = %root.display(), "using file job store");
            Ok(Arc::new(FileStore::open(root)?))
        }
        StoreTarget::Mongo(uri) => {
            info!("using MongoDB job store");
            Ok(Arc::new(MongoStore::connect(&uri).await?))
        }
    }
}
