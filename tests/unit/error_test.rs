//! Tests for error types

use std::time::Duration;

use prometheus_job_runner::core::{JobId, SchedulerError};

#[test]
fn test_store_error() {
    let err = SchedulerError::Store("connection refused".to_string());
    assert_eq!(format!("{err}"), "store error: connection refused");
}

#[test]
fn test_store_timeout_error() {
    let err = SchedulerError::StoreTimeout {
        operation: "claim_next",
        timeout: Duration::from_secs(2),
    };
    assert_eq!(
        format!("{err}"),
        "store operation `claim_next` timed out after 2s"
    );
}

#[test]
fn test_spawn_error() {
    let err = SchedulerError::Spawn {
        job_id: JobId::new("abc"),
        reason: "No such file or directory".to_string(),
    };
    assert_eq!(
        format!("{err}"),
        "failed to spawn job abc: No such file or directory"
    );
}

#[test]
fn test_unreleased_error() {
    let err = SchedulerError::Unreleased {
        jobs: vec![JobId::new("a"), JobId::new("b")],
    };
    assert_eq!(
        format!("{err}"),
        "2 job(s) could not be released and stay claimed"
    );
}

#[test]
fn test_config_error() {
    let err = SchedulerError::Config("bad scheme".to_string());
    assert_eq!(format!("{err}"), "config error: bad scheme");
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: SchedulerError = io.into();
    assert!(matches!(err, SchedulerError::Io(_)));
}
