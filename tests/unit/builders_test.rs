//! Tests for builder modules

use std::path::PathBuf;

use prometheus_job_runner::builders::{build_store, StoreTarget};
use prometheus_job_runner::core::{JobStore, NewJob, SchedulerError};

#[test]
fn test_memory_target() {
    assert_eq!(StoreTarget::parse("memory://").unwrap(), StoreTarget::InMemory);
    assert_eq!(StoreTarget::parse(" memory\n").unwrap(), StoreTarget::InMemory);
}

#[test]
fn test_file_targets() {
    assert_eq!(
        StoreTarget::parse("file:///var/lib/jobs").unwrap(),
        StoreTarget::File(PathBuf::from("/var/lib/jobs"))
    );
    assert_eq!(
        StoreTarget::parse("./queue-data").unwrap(),
        StoreTarget::File(PathBuf::from("./queue-data"))
    );
}

#[test]
fn test_mongodb_targets() {
    assert_eq!(
        StoreTarget::parse("mongodb+srv://user:pw@cluster.example.net/?retryWrites=true\n").unwrap(),
        StoreTarget::Mongo("mongodb+srv://user:pw@cluster.example.net/?retryWrites=true".into())
    );
    assert_eq!(
        StoreTarget::parse("mongodb://localhost:27017").unwrap(),
        StoreTarget::Mongo("mongodb://localhost:27017".into())
    );
}

#[test]
fn test_unknown_scheme_rejected() {
    let err = StoreTarget::parse("redis://localhost:6379").unwrap_err();
    assert!(matches!(err, SchedulerError::Config(_)));
    assert!(StoreTarget::parse("file://").is_err());
}

#[tokio::test]
async fn test_built_store_is_usable() {
    let store = build_store("memory://").await.unwrap();
    store.enqueue(NewJob::new("true").with_priority(3)).await.unwrap();
    assert_eq!(store.pending_count().await.unwrap(), 1);

    let job = store.claim_next().await.unwrap().unwrap();
    assert_eq!(job.priority, 3);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_built_file_store_creates_directory() {
    let root = std::env::temp_dir().join(format!("job-runner-builder-{}", std::process::id()));
    let store = build_store(&format!("file://{}", root.display()))
        .await
        .unwrap();
    assert!(root.is_dir());
    assert_eq!(store.pending_count().await.unwrap(), 0);
    std::fs::remove_dir_all(root).ok();
}
