// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contracts consumed by the scheduler: the execution callback and the
//! schedule persistence layer.

use crate::schedule::{ScheduleError, ScheduledJob};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by an execution manager.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("job '{0}' is already running")]
    AlreadyRunning(String),
    #[error("could not run job '{id}': {message}")]
    Failed { id: String, message: String },
}

/// Resolves a fired job id into work and starts it.
///
/// Fire-and-forget: the scheduler logs returned errors and moves on.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, job_id: &str, ignore_dependency: bool) -> Result<(), ExecuteError>;
}

/// Errors from loading or saving a schedule.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid schedule entry '{id}': {message}")]
    InvalidEntry { id: String, message: String },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Persistence for the live schedule.
pub trait ScheduleLoader: Send + Sync + 'static {
    fn load_schedule(&self) -> Result<Vec<ScheduledJob>, LoadError>;

    fn save_schedule(&self, schedule: &[ScheduledJob]) -> Result<(), LoadError>;
}
