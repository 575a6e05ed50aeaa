//! Tests for configuration validation

use std::path::PathBuf;

use prometheus_job_runner::config::{read_connection_string, RunnerConfig};

#[test]
fn test_default_config_is_valid() {
    let config = RunnerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.idle_pass_threshold, 10);
    assert_eq!(config.grace_timeout_ms, 1_000);
    assert_eq!(config.connection_file, PathBuf::from("connection_string.txt"));
    assert!(!config.recover_stale_claims);
}

#[test]
fn test_worker_count_defaults_to_cpu_count() {
    let config = RunnerConfig::default();
    assert_eq!(config.resolved_worker_count(), num_cpus::get().max(1));

    let pinned = RunnerConfig {
        worker_count: Some(3),
        ..RunnerConfig::default()
    };
    assert_eq!(pinned.resolved_worker_count(), 3);
}

#[test]
fn test_config_invalid_worker_count() {
    let invalid = RunnerConfig {
        worker_count: Some(0),
        ..RunnerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_poll_interval() {
    let invalid = RunnerConfig {
        poll_interval_ms: 0,
        ..RunnerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_idle_threshold() {
    let invalid = RunnerConfig {
        idle_pass_threshold: 0,
        ..RunnerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_store_timeout() {
    let invalid = RunnerConfig {
        store_timeout_ms: 0,
        ..RunnerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "worker_count": 4,
        "poll_interval_ms": 250,
        "idle_pass_threshold": 20,
        "connection_file": "/etc/job-runner/connection"
    }"#;

    let config = RunnerConfig::from_json_str(json).unwrap();
    assert_eq!(config.worker_count, Some(4));
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.idle_pass_threshold, 20);
    assert_eq!(config.idle_backoff_ms, 5_000);
    assert_eq!(config.connection_file, PathBuf::from("/etc/job-runner/connection"));
}

#[test]
fn test_config_from_json_rejects_unknown_fields() {
    let err = RunnerConfig::from_json_str(r#"{"workers": 4}"#).unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_from_json_validates() {
    assert!(RunnerConfig::from_json_str(r#"{"worker_count": 0}"#).is_err());
}

#[test]
fn test_connection_string_is_trimmed() {
    let path = std::env::temp_dir().join(format!("job-runner-conn-{}", std::process::id()));
    std::fs::write(&path, "  memory://\n").unwrap();
    assert_eq!(read_connection_string(&path).unwrap(), "memory://");

    std::fs::write(&path, "\n \n").unwrap();
    assert!(read_connection_string(&path).is_err());
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_missing_connection_file_is_config_error() {
    let err = read_connection_string("/nonexistent/connection_string.txt").unwrap_err();
    assert!(err.to_string().starts_with("config error"));
}
