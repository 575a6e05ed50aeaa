//! Tests for utility functions

use prometheus_job_runner::core::{JobId, JobStatus, NewJob};
use prometheus_job_runner::util::{init_tracing, now_secs};

#[test]
fn test_now_secs_is_recent() {
    // 2020-01-01T00:00:00Z
    assert!(now_secs() > 1_577_836_800.0);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_generated_ids_are_unique() {
    let a = JobId::generate();
    let b = JobId::generate();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 32);
}

#[test]
fn test_new_job_builder() {
    let job = NewJob::new("make all")
        .with_directory("/src")
        .with_priority(-2)
        .into_job(JobId::new("x"));
    assert_eq!(job.command, "make all");
    assert_eq!(job.directory, "/src");
    assert_eq!(job.priority, -2);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 0);
}

#[test]
fn test_queue_document_round_trips_store_field_names() {
    let json = r#"{"_id":"d1","command":"ls","directory":"/tmp","priority":5,"status":1,"attempt_count":2,"rand":0.25}"#;
    let job: prometheus_job_runner::core::Job = serde_json::from_str(json).unwrap();
    assert_eq!(job.status, JobStatus::Claimed);
    let value = serde_json::to_value(&job).unwrap();
    assert_eq!(value["_id"], "d1");
    assert_eq!(value["status"], 1);
    assert_eq!(value["rand"], 0.25);
}
