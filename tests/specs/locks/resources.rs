//! Read/write resource locks and lock groups guarding jobs.

use crate::prelude::*;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tw_core::test_support::{ConcurrencyGauge, FakeJob};
use tw_core::{Job, JobError, TimeUnit};
use tw_engine::ResourceThrottledJob;
use tw_locks::{GroupLock, JobLock, LockStatus, NamedPermitManager, ReadWriteLockManager};

fn spawn_run(job: Arc<ResourceThrottledJob>) -> tokio::task::JoinHandle<Result<(), JobError>> {
    tokio::spawn(async move { job.run().await })
}

#[tokio::test]
async fn writers_to_one_resource_take_turns() {
    let locks = ReadWriteLockManager::new();
    let gauge = ConcurrencyGauge::new();

    let runners: Vec<_> = (0..3)
        .map(|i| {
            let inner = FakeJob::builder(&format!("writer-{i}"))
                .delay(Duration::from_millis(30))
                .gauge(&gauge)
                .build();
            spawn_run(Arc::new(ResourceThrottledJob::new(
                Arc::new(inner),
                Arc::new(locks.write_lock("orders")),
            )))
        })
        .collect();
    for runner in runners {
        runner.await.unwrap().unwrap();
    }

    assert_eq!(gauge.peak(), 1);
    assert_eq!(locks.resource_count(), 1);
}

#[tokio::test]
async fn readers_share_a_resource() {
    let locks = ReadWriteLockManager::new();
    let gauge = ConcurrencyGauge::new();

    let runners: Vec<_> = (0..3)
        .map(|i| {
            let inner = FakeJob::builder(&format!("reader-{i}"))
                .delay(Duration::from_millis(150))
                .gauge(&gauge)
                .build();
            spawn_run(Arc::new(ResourceThrottledJob::new(
                Arc::new(inner),
                Arc::new(locks.read_lock("orders")),
            )))
        })
        .collect();
    for runner in runners {
        runner.await.unwrap().unwrap();
    }

    assert!(gauge.peak() >= 2, "peak {}", gauge.peak());
}

#[tokio::test]
async fn interrupted_group_releases_what_it_took() {
    let permits = NamedPermitManager::new();
    permits.create_named_permit("cpu", 1);
    let resources = ReadWriteLockManager::new();
    let token = CancellationToken::new();

    // Someone else is writing the table
    let writer = resources.write_lock("table");
    writer.acquire_lock(&token).await.unwrap();

    let group = Arc::new(GroupLock::group(vec![
        Arc::new(permits.named_permit("cpu", 1).unwrap()) as Arc<dyn JobLock>,
        Arc::new(resources.write_lock("table")) as Arc<dyn JobLock>,
    ]));
    let inner = FakeJob::ok("report");
    let shutdown = CancellationToken::new();
    let job = Arc::new(ResourceThrottledJob::with_interrupt(
        Arc::new(inner.clone()),
        Arc::clone(&group) as Arc<dyn JobLock>,
        &shutdown,
    ));

    let runner = spawn_run(Arc::clone(&job));
    assert!(wait_for(|| permits.available_permits("cpu") == Some(0)).await);

    shutdown.cancel();
    let err = runner.await.unwrap().unwrap_err();

    assert_eq!(err, JobError::Interrupted("report".to_string()));
    assert_eq!(inner.runs(), 0);
    assert_eq!(permits.available_permits("cpu"), Some(1));
    assert_eq!(group.status(), LockStatus::Unused);
    writer.release_lock().await;
}

#[tokio::test]
async fn lock_timing_adds_up() {
    let permits = NamedPermitManager::new();
    permits.create_named_permit("cpu", 1);
    let lock = Arc::new(permits.named_permit("cpu", 1).unwrap());
    assert_eq!(lock.total_lock_time(TimeUnit::Milliseconds), -1);

    let inner = FakeJob::builder("report")
        .delay(Duration::from_millis(30))
        .build();
    let job = Arc::new(ResourceThrottledJob::new(
        Arc::new(inner),
        Arc::clone(&lock) as Arc<dyn JobLock>,
    ));
    job.run().await.unwrap();

    let acquire = lock.lock_acquire_time(TimeUnit::Milliseconds);
    let held = lock.lock_held_time(TimeUnit::Milliseconds);
    assert!(held >= 30, "held {held}");
    assert_eq!(lock.total_lock_time(TimeUnit::Milliseconds), acquire + held);
    assert_eq!(lock.status(), LockStatus::ReleasedLock);
}
