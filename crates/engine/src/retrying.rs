// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry decorator.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tw_core::{Job, JobError};

/// Runs the inner job up to `retries + 1` times, sleeping `backoff` between
/// attempts.
pub struct RetryingJob {
    inner: Arc<dyn Job>,
    retries: u32,
    backoff: Duration,
    cancelled: CancellationToken,
}

impl RetryingJob {
    pub fn new(inner: Arc<dyn Job>, retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
            cancelled: CancellationToken::new(),
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    fn exhausted(&self) -> JobError {
        let plural = if self.retries > 1 { "s" } else { "" };
        JobError::Failed(format!("{} run attempt{} failed.", self.retries, plural))
    }
}

#[async_trait]
impl Job for RetryingJob {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn run(&self) -> Result<(), JobError> {
        let id = self.inner.id();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                if self.cancelled.is_cancelled() {
                    return Err(JobError::Interrupted(id.to_string()));
                }
                if !self.backoff.is_zero() {
                    info!(job = id, backoff_ms = self.backoff.as_millis() as u64, "waiting before retry");
                    tokio::select! {
                        _ = self.cancelled.cancelled() => {
                            info!(job = id, "retry backoff interrupted");
                            return Err(JobError::Interrupted(id.to_string()));
                        }
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
                info!(job = id, attempt = attempt + 1, "retrying failed job");
            }

            match self.inner.run().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_not_run() => return Err(e),
                Err(e) => {
                    error!(job = id, attempt = attempt + 1, error = %e, "job attempt failed");
                }
            }
        }
        Err(self.exhausted())
    }

    async fn cancel(&self) -> Result<(), JobError> {
        self.cancelled.cancel();
        self.inner.cancel().await
    }

    fn progress(&self) -> f64 {
        self.inner.progress()
    }
}

#[cfg(test)]
#[path = "retrying_tests.rs"]
mod tests;
