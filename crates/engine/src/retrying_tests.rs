// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tw_core::test_support::FakeJob;

#[yare::parameterized(
    first_try       = { 0, 2, 1 },
    second_try      = { 1, 2, 2 },
    last_try        = { 2, 2, 3 },
    no_retries_ok   = { 0, 0, 1 },
)]
#[test_macro(tokio::test)]
async fn succeeds_after_failures(failures: usize, retries: u32, expected_runs: usize) {
    let inner = FakeJob::builder("etl").fail_times(failures).build();
    let job = RetryingJob::new(Arc::new(inner.clone()), retries, Duration::ZERO);

    job.run().await.unwrap();
    assert_eq!(inner.runs(), expected_runs);
}

#[yare::parameterized(
    none     = { 0, "0 run attempt failed." },
    one      = { 1, "1 run attempt failed." },
    several  = { 3, "3 run attempts failed." },
)]
#[test_macro(tokio::test)]
async fn exhaustion_is_one_terminal_failure(retries: u32, message: &str) {
    let inner = FakeJob::builder("etl").fail_times(10).build();
    let job = RetryingJob::new(Arc::new(inner.clone()), retries, Duration::ZERO);

    let err = job.run().await.unwrap_err();
    assert_eq!(err, JobError::Failed(message.to_string()));
    assert_eq!(inner.runs(), retries as usize + 1);
}

#[tokio::test]
async fn backoff_only_between_attempts() {
    let inner = FakeJob::builder("etl").fail_times(2).build();
    let job = RetryingJob::new(Arc::new(inner.clone()), 2, Duration::from_millis(40));

    let start = std::time::Instant::now();
    job.run().await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(80), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(120 + 500), "{elapsed:?}");
    assert_eq!(inner.runs(), 3);
}

#[tokio::test]
async fn cancel_interrupts_backoff() {
    let inner = FakeJob::builder("etl").fail_times(5).build();
    let job = Arc::new(RetryingJob::new(
        Arc::new(inner.clone()),
        5,
        Duration::from_secs(3600),
    ));

    let runner = {
        let job = Arc::clone(&job);
        tokio::spawn(async move { job.run().await })
    };
    while inner.runs() == 0 {
        tokio::task::yield_now().await;
    }

    // Inner job does not support cancel; the backoff still stops
    assert!(job.cancel().await.is_err());
    let err = runner.await.unwrap().unwrap_err();

    assert_eq!(err, JobError::Interrupted("etl".to_string()));
    assert_eq!(inner.runs(), 1);
    assert_eq!(inner.cancels(), 1);
}

#[tokio::test]
async fn cancelled_inner_run_is_not_retried() {
    let inner = FakeJob::builder("etl")
        .delay(Duration::from_secs(30))
        .cancellable()
        .build();
    let job = Arc::new(RetryingJob::new(Arc::new(inner.clone()), 3, Duration::ZERO));

    let runner = {
        let job = Arc::clone(&job);
        tokio::spawn(async move { job.run().await })
    };
    while inner.runs() == 0 {
        tokio::task::yield_now().await;
    }
    job.cancel().await.unwrap();

    let err = runner.await.unwrap().unwrap_err();
    assert!(err.is_not_run());
    assert_eq!(inner.runs(), 1);
}

#[test]
fn delegates_identity() {
    let inner = FakeJob::ok("etl");
    inner.set_progress(0.5);
    let job = RetryingJob::new(Arc::new(inner), 1, Duration::from_millis(5));

    assert_eq!(job.id(), "etl");
    assert_eq!(job.progress(), 0.5);
    assert_eq!(job.retries(), 1);
    assert_eq!(job.backoff(), Duration::from_millis(5));
}
