// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-of-work contract and the node state machine used by job graphs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Identity of a job. Graph nodes, status maps and schedules are all keyed
/// by it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for JobId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for JobId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Errors surfaced by a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job ran and failed.
    #[error("{0}")]
    Failed(String),
    /// The job was interrupted while blocked (lock wait, retry backoff) and
    /// did not run to completion. Distinct from a failure.
    #[error("job '{0}' was interrupted before completing")]
    Interrupted(String),
    /// The job observed a cancellation request and chose not to run.
    #[error("job '{0}' was cancelled")]
    Cancelled(String),
    #[error("job '{0}' does not support cancellation")]
    CancelUnsupported(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }

    /// True for outcomes where the job did not run rather than failed.
    pub fn is_not_run(&self) -> bool {
        matches!(self, JobError::Interrupted(_) | JobError::Cancelled(_))
    }
}

/// A runnable unit of work.
///
/// Decorators and the graph executor depend only on this contract.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Run the job to completion. An `Err` marks the job failed.
    async fn run(&self) -> Result<(), JobError>;

    /// Ask a running job to stop. Jobs that cannot be stopped keep the
    /// default, which reports the request as unsupported.
    async fn cancel(&self) -> Result<(), JobError> {
        Err(JobError::CancelUnsupported(self.id().to_string()))
    }

    /// Fraction complete in `0.0..=1.0`.
    fn progress(&self) -> f64 {
        0.0
    }
}

/// Per-job execution context, prepared on the worker right before `run()`.
pub trait JobDescriptor: Send + Sync {
    fn prepare(&self) -> Result<(), JobError>;
}

/// Status of a node inside a dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Some dependency has not succeeded yet
    Waiting,
    /// All dependencies succeeded; eligible for dispatch
    Ready,
    /// Claimed by a worker
    Running,
    Success,
    Failed,
    /// A dependency failed; this node will never run
    DependentFailed,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Success | NodeStatus::Failed | NodeStatus::DependentFailed
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, NodeStatus::Failed | NodeStatus::DependentFailed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Waiting => write!(f, "waiting"),
            NodeStatus::Ready => write!(f, "ready"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::DependentFailed => write!(f, "dependent_failed"),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
