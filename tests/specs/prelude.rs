//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tw_core::{ExecuteError, Job, JobError, JobExecutor};
use tw_engine::JobGraph;

pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 5000;

/// Poll `check` until it holds or the spec timeout passes.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
    check()
}

/// A UTC time `ms` milliseconds from now.
pub fn in_ms(ms: i64) -> DateTime<Tz> {
    (Utc::now() + TimeDelta::milliseconds(ms)).with_timezone(&chrono_tz::UTC)
}

type GraphBuilder = Box<dyn Fn(bool) -> JobGraph + Send + Sync>;

/// Execution manager that resolves a fired id into a freshly built graph
/// and records how each run ended.
#[derive(Clone, Default)]
pub struct GraphExecutor {
    builders: Arc<Mutex<HashMap<String, GraphBuilder>>>,
    outcomes: Arc<Mutex<Vec<(String, Result<(), JobError>)>>>,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph with `builder` whenever `id` fires. The builder gets
    /// the fired entry's ignore-dependency flag.
    pub fn register(&self, id: &str, builder: impl Fn(bool) -> JobGraph + Send + Sync + 'static) {
        self.builders
            .lock()
            .insert(id.to_string(), Box::new(builder));
    }

    pub fn outcomes(&self) -> Vec<(String, Result<(), JobError>)> {
        self.outcomes.lock().clone()
    }

    pub fn outcomes_for(&self, id: &str) -> Vec<Result<(), JobError>> {
        self.outcomes
            .lock()
            .iter()
            .filter(|(job, _)| job == id)
            .map(|(_, outcome)| outcome.clone())
            .collect()
    }
}

#[async_trait]
impl JobExecutor for GraphExecutor {
    async fn execute(&self, job_id: &str, ignore_dependency: bool) -> Result<(), ExecuteError> {
        let graph = {
            let builders = self.builders.lock();
            let builder = builders
                .get(job_id)
                .ok_or_else(|| ExecuteError::UnknownJob(job_id.to_string()))?;
            builder(ignore_dependency)
        };
        let outcomes = Arc::clone(&self.outcomes);
        let id = job_id.to_string();
        tokio::spawn(async move {
            let outcome = graph.run().await;
            outcomes.lock().push((id, outcome));
        });
        Ok(())
    }
}
