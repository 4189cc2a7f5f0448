// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-guarded decorator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tw_core::{Job, JobError, TimeUnit};
use tw_locks::{JobLock, LockError};

/// Whether the inner job was cancelled or handed its run. Read and written
/// together so a cancel either stops the run or reaches the inner job.
#[derive(Debug, Default)]
struct RunState {
    cancelled: bool,
    started: bool,
}

/// Holds `lock` for the whole run of the inner job.
///
/// The lock is released on every exit path, including a panic in the inner
/// job. Cancelling while the lock is still being awaited stops the wait and
/// the inner job never runs.
///
/// Lock handles are single use, so put a [`crate::RetryingJob`] inside this
/// decorator rather than around it.
pub struct ResourceThrottledJob {
    inner: Arc<dyn Job>,
    lock: Arc<dyn JobLock>,
    interrupt: CancellationToken,
    run_state: Mutex<RunState>,
    last_lock_wait: Mutex<Option<Duration>>,
}

impl ResourceThrottledJob {
    pub fn new(inner: Arc<dyn Job>, lock: Arc<dyn JobLock>) -> Self {
        Self::with_token(inner, lock, CancellationToken::new())
    }

    /// Like [`ResourceThrottledJob::new`], but the lock wait is also
    /// interrupted when `interrupt` fires.
    pub fn with_interrupt(
        inner: Arc<dyn Job>,
        lock: Arc<dyn JobLock>,
        interrupt: &CancellationToken,
    ) -> Self {
        Self::with_token(inner, lock, interrupt.child_token())
    }

    fn with_token(inner: Arc<dyn Job>, lock: Arc<dyn JobLock>, interrupt: CancellationToken) -> Self {
        Self {
            inner,
            lock,
            interrupt,
            run_state: Mutex::new(RunState::default()),
            last_lock_wait: Mutex::new(None),
        }
    }

    pub fn lock(&self) -> &Arc<dyn JobLock> {
        &self.lock
    }

    /// How long the most recent run waited for the lock.
    pub fn last_lock_wait(&self) -> Option<Duration> {
        *self.last_lock_wait.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.run_state.lock().cancelled
    }

    /// Marks the inner job started unless a cancel got there first.
    fn try_start(&self) -> bool {
        let mut state = self.run_state.lock();
        if state.cancelled {
            return false;
        }
        state.started = true;
        true
    }

    fn not_run(&self, err: LockError) -> JobError {
        let id = self.inner.id().to_string();
        match err {
            LockError::Interrupted(_) if self.is_cancelled() => JobError::Cancelled(id),
            LockError::Interrupted(_) => JobError::Interrupted(id),
            LockError::Closed(what) => {
                JobError::Failed(format!("could not acquire lock for {}: {} was closed", id, what))
            }
        }
    }
}

#[async_trait]
impl Job for ResourceThrottledJob {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn run(&self) -> Result<(), JobError> {
        let id = self.inner.id();
        if self.is_cancelled() {
            info!(job = id, "job cancelled before acquiring its lock, not running");
            return Err(JobError::Cancelled(id.to_string()));
        }

        let waiting = Instant::now();
        if let Err(e) = self.lock.acquire_lock(&self.interrupt).await {
            info!(job = id, error = %e, "lock wait ended without the lock, not running");
            return Err(self.not_run(e));
        }
        let waited = waiting.elapsed();
        *self.last_lock_wait.lock() = Some(waited);
        info!(job = id, wait_ms = waited.as_millis() as u64, lock = %self.lock, "acquired lock");

        if !self.try_start() {
            self.lock.release_lock().await;
            info!(job = id, "job cancelled while waiting for its lock, not running");
            return Err(JobError::Cancelled(id.to_string()));
        }

        let inner = Arc::clone(&self.inner);
        let outcome = tokio::spawn(async move { inner.run().await }).await;
        self.lock.release_lock().await;
        info!(
            job = id,
            held_ms = self.lock.lock_held_time(TimeUnit::Milliseconds),
            "released lock",
        );

        match outcome {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!(job = id, "job panicked while holding its lock");
                std::panic::resume_unwind(e.into_panic());
            }
            Err(e) => Err(JobError::Failed(format!("job task for {} aborted: {}", id, e))),
        }
    }

    /// Stops a pending lock wait; forwards to the inner job once it runs.
    async fn cancel(&self) -> Result<(), JobError> {
        let started = {
            let mut state = self.run_state.lock();
            state.cancelled = true;
            state.started
        };
        self.interrupt.cancel();
        if !started {
            return Ok(());
        }
        self.inner.cancel().await
    }

    fn progress(&self) -> f64 {
        self.inner.progress()
    }
}

#[cfg(test)]
#[path = "throttled_tests.rs"]
mod tests;
