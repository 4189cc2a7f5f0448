// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution manager for fired schedule entries.
//!
//! Each fired id becomes a job run under a permit from a shared pool, so at
//! most `permits` fired jobs run at once. A job id that is still running is
//! refused rather than queued twice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};
use tw_core::{ExecuteError, Job, JobError, JobExecutor};
use tw_engine::ResourceThrottledJob;
use tw_locks::NamedPermitManager;

/// Name of the permit pool fired jobs draw from.
pub const PERMIT_POOL: &str = "fired-jobs";

pub const DEFAULT_PERMITS: u32 = 4;

type JobFactory = dyn Fn(&str, bool) -> Arc<dyn Job> + Send + Sync;

/// Job that records the firing of a schedule entry in the daemon log.
struct FiredJob {
    id: String,
    ignore_dependency: bool,
}

#[async_trait]
impl Job for FiredJob {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<(), JobError> {
        info!(
            job = %self.id,
            ignore_dependency = self.ignore_dependency,
            "scheduled job fired",
        );
        Ok(())
    }
}

pub struct TracingExecutor {
    permits: NamedPermitManager,
    factory: Box<JobFactory>,
    running: Arc<Mutex<HashMap<String, Arc<ResourceThrottledJob>>>>,
}

impl TracingExecutor {
    pub fn new(permits: u32) -> Self {
        Self::with_factory(permits, |id, ignore_dependency| {
            Arc::new(FiredJob {
                id: id.to_string(),
                ignore_dependency,
            })
        })
    }

    /// Build the job for each fired id with `factory`.
    pub fn with_factory(
        permits: u32,
        factory: impl Fn(&str, bool) -> Arc<dyn Job> + Send + Sync + 'static,
    ) -> Self {
        let manager = NamedPermitManager::new();
        manager.create_named_permit(PERMIT_POOL, permits);
        Self {
            permits: manager,
            factory: Box::new(factory),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ids of fired jobs that have not finished.
    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.running.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits(PERMIT_POOL).unwrap_or(0)
    }

    /// Ask every running job to stop. Waiting jobs give up their permit wait.
    pub async fn cancel_all(&self) {
        let jobs: Vec<_> = self.running.lock().values().cloned().collect();
        for job in jobs {
            match job.cancel().await {
                Ok(()) => info!(job = job.id(), "cancelled fired job"),
                Err(e) => warn!(job = job.id(), error = %e, "could not cancel fired job"),
            }
        }
    }
}

#[async_trait]
impl JobExecutor for TracingExecutor {
    async fn execute(&self, job_id: &str, ignore_dependency: bool) -> Result<(), ExecuteError> {
        let job = {
            let mut running = self.running.lock();
            if running.contains_key(job_id) {
                return Err(ExecuteError::AlreadyRunning(job_id.to_string()));
            }
            let lock = self
                .permits
                .named_permit(PERMIT_POOL, 1)
                .ok_or_else(|| ExecuteError::Failed {
                    id: job_id.to_string(),
                    message: format!("permit pool '{}' is missing", PERMIT_POOL),
                })?;
            let inner = (self.factory)(job_id, ignore_dependency);
            let job = Arc::new(ResourceThrottledJob::new(inner, Arc::new(lock)));
            running.insert(job_id.to_string(), Arc::clone(&job));
            job
        };

        let running = Arc::clone(&self.running);
        let id = job_id.to_string();
        tokio::spawn(async move {
            let runner = Arc::clone(&job);
            let outcome = tokio::spawn(async move { runner.run().await }).await;
            running.lock().remove(&id);
            match outcome {
                Ok(Ok(())) => info!(job = %id, "fired job finished"),
                Ok(Err(e)) if e.is_not_run() => info!(job = %id, error = %e, "fired job did not run"),
                Ok(Err(e)) => warn!(job = %id, error = %e, "fired job failed"),
                Err(e) => warn!(job = %id, error = %e, "fired job panicked"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
