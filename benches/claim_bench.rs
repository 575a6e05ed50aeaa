//! Benchmarks for the queue protocol.
//!
//! Benchmarks cover:
//! - Claim throughput of the in-memory store as the queue grows
//! - Claim plus completion reconciliation through `QueueClient`
//! - Claim throughput of the file store

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use prometheus_job_runner::core::{JobStore, NewJob, QueueClient};
use prometheus_job_runner::infra::{FileStore, InMemoryStore};
use tokio::runtime::Runtime;

// ============================================================================
// Helper Functions
// ============================================================================

fn build_job(i: u64) -> NewJob {
    NewJob::new(format!("echo job-{i}")).with_priority(i64::try_from(i % 7).unwrap_or(0))
}

async fn filled_memory_store(size: u64) -> InMemoryStore {
    let store = InMemoryStore::new();
    for i in 0..size {
        store.enqueue(build_job(i)).await.unwrap();
    }
    store
}

// ============================================================================
// Store Benchmarks
// ============================================================================

fn bench_memory_claim_all(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_claim_all");

    for size in [100, 1_000, 5_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let store = filled_memory_store(size).await;
                while let Some(job) = store.claim_next().await.unwrap() {
                    black_box(job);
                }
            });
        });
    }
    group.finish();
}

fn bench_claim_and_complete(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("claim_and_complete");

    for size in [100, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let store = Arc::new(filled_memory_store(size).await);
                let queue = QueueClient::new(store, Duration::from_secs(5));
                while let Some(job) = queue.claim_next().await {
                    black_box(queue.mark_completed(&job.id).await.unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_file_claim(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("file_claim");
    group.sample_size(10);

    for size in [50, 200] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let root = std::env::temp_dir()
                    .join(format!("job-runner-bench-{}", uuid::Uuid::new_v4()));
                let store = FileStore::open(&root).unwrap();
                for i in 0..size {
                    store.enqueue(build_job(i)).await.unwrap();
                }
                while let Some(job) = store.claim_next().await.unwrap() {
                    black_box(job);
                }
                std::fs::remove_dir_all(root).ok();
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(store_benches, bench_memory_claim_all, bench_file_claim);

criterion_group!(protocol_benches, bench_claim_and_complete);

criterion_main!(store_benches, protocol_benches);
