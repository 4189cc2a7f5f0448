// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency-graph executor.
//!
//! A coordinator loop files every node into one of five queues by its status
//! and, on each pass:
//! 1. re-files running nodes (workers update status when they finish),
//! 2. recomputes waiting nodes from their dependencies,
//! 3. claims ready nodes and hands each to a worker task.
//!
//! Passes are separated by the poll interval or a worker completion,
//! whichever comes first. The graph is done when nothing is waiting, ready
//! or running.

use crate::status_map::JobStatusMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use tw_core::{Job, JobDescriptor, JobError, JobId, NodeStatus};

/// Default delay between coordinator passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub poll_interval: Duration,
    /// Upper bound on concurrently running nodes; `None` for unbounded.
    pub max_parallel: Option<usize>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_parallel: None,
        }
    }
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Ready,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphState::Ready => write!(f, "ready"),
            GraphState::Running => write!(f, "running"),
            GraphState::Stopping => write!(f, "stopping"),
            GraphState::Stopped => write!(f, "stopped"),
        }
    }
}

type Queue = BTreeMap<JobId, Arc<dyn Job>>;

#[derive(Default)]
struct Queues {
    waiting: Queue,
    ready: Queue,
    running: Queue,
    successful: Queue,
    failed: Queue,
}

impl Queues {
    fn for_status(&mut self, status: NodeStatus) -> &mut Queue {
        match status {
            NodeStatus::Waiting => &mut self.waiting,
            NodeStatus::Ready => &mut self.ready,
            NodeStatus::Running => &mut self.running,
            NodeStatus::Success => &mut self.successful,
            NodeStatus::Failed | NodeStatus::DependentFailed => &mut self.failed,
        }
    }

    fn remove(&mut self, id: &str) {
        self.waiting.remove(id);
        self.ready.remove(id);
        self.running.remove(id);
        self.successful.remove(id);
        self.failed.remove(id);
    }

    fn active(&self) -> usize {
        self.waiting.len() + self.ready.len() + self.running.len()
    }
}

/// Executes a set of jobs respecting their dependencies.
pub struct JobGraph {
    id: String,
    config: GraphConfig,
    statuses: Arc<JobStatusMap>,
    descriptors: Option<Arc<HashMap<JobId, Arc<dyn JobDescriptor>>>>,
    dependencies: Mutex<BTreeMap<JobId, Vec<Arc<dyn Job>>>>,
    queues: Mutex<Queues>,
    wrapped: Mutex<Option<Arc<dyn Job>>>,
    exception: Mutex<String>,
    state: Mutex<GraphState>,
    completed: Arc<Notify>,
    limiter: Option<Arc<Semaphore>>,
}

impl JobGraph {
    pub fn new(id: impl Into<String>, config: GraphConfig) -> Self {
        let limiter = config
            .max_parallel
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            id: id.into(),
            config,
            statuses: Arc::new(JobStatusMap::new()),
            descriptors: None,
            dependencies: Mutex::new(BTreeMap::new()),
            queues: Mutex::new(Queues::default()),
            wrapped: Mutex::new(None),
            exception: Mutex::new(String::new()),
            state: Mutex::new(GraphState::Ready),
            completed: Arc::new(Notify::new()),
            limiter,
        }
    }

    /// Track node status in `statuses`, shared with other graphs.
    pub fn with_status_map(mut self, statuses: Arc<JobStatusMap>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Require every node to have a descriptor, prepared on the worker
    /// before the node runs. Nodes without one fail.
    pub fn with_descriptors(mut self, descriptors: HashMap<JobId, Arc<dyn JobDescriptor>>) -> Self {
        self.descriptors = Some(Arc::new(descriptors));
        self
    }

    pub fn status_map(&self) -> &Arc<JobStatusMap> {
        &self.statuses
    }

    /// Register `job` and the jobs it depends on.
    ///
    /// Nodes start `Waiting` unless the status map already knows them. A job
    /// whose id equals the graph's id is the wrapped job and decides the
    /// graph's outcome.
    pub fn add_job(&self, job: Arc<dyn Job>, dependencies: Vec<Arc<dyn Job>>) {
        for node in std::iter::once(&job).chain(dependencies.iter()) {
            let status = self.statuses.insert_if_absent(node.id(), NodeStatus::Waiting);
            let mut queues = self.queues.lock();
            queues.remove(node.id());
            queues
                .for_status(status)
                .insert(JobId::new(node.id()), Arc::clone(node));
        }

        if job.id() == self.id {
            *self.wrapped.lock() = Some(Arc::clone(&job));
        }
        self.dependencies
            .lock()
            .insert(JobId::new(job.id()), dependencies);
    }

    pub fn state(&self) -> GraphState {
        *self.state.lock()
    }

    /// Dependency failures recorded so far, one line each.
    pub fn exception_string(&self) -> String {
        self.exception.lock().clone()
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.statuses.get(id)
    }

    pub fn waiting_jobs(&self) -> Vec<JobId> {
        self.queues.lock().waiting.keys().cloned().collect()
    }

    pub fn ready_jobs(&self) -> Vec<JobId> {
        self.queues.lock().ready.keys().cloned().collect()
    }

    pub fn running_jobs(&self) -> Vec<JobId> {
        self.queues.lock().running.keys().cloned().collect()
    }

    pub fn successful_jobs(&self) -> Vec<JobId> {
        self.queues.lock().successful.keys().cloned().collect()
    }

    pub fn failed_jobs(&self) -> Vec<JobId> {
        self.queues.lock().failed.keys().cloned().collect()
    }

    /// Declared dependencies of every node added with [`JobGraph::add_job`].
    pub fn dependencies(&self) -> BTreeMap<JobId, Vec<JobId>> {
        self.dependencies
            .lock()
            .iter()
            .map(|(id, deps)| (id.clone(), deps.iter().map(|d| JobId::new(d.id())).collect()))
            .collect()
    }

    pub fn all_finished(&self) -> bool {
        self.queues.lock().active() == 0
    }

    /// Drive every node to a terminal status.
    async fn execute(&self) -> Result<(), JobError> {
        {
            let mut state = self.state.lock();
            if *state == GraphState::Ready {
                *state = GraphState::Running;
            }
        }
        info!(graph = %self.id, "starting job graph");

        let mut cancel_requested: HashSet<JobId> = HashSet::new();
        loop {
            if self.state() == GraphState::Stopping {
                self.stop_pending(&mut cancel_requested).await;
            }

            self.reclaim_running();
            self.advance_waiting();
            self.dispatch_ready();

            if self.all_finished() {
                *self.state.lock() = GraphState::Stopped;
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.completed.notified() => {}
            }
        }
        info!(graph = %self.id, "job graph finished");

        let wrapped = self.wrapped.lock().clone();
        if let Some(wrapped) = wrapped {
            if self.statuses.get(wrapped.id()) != Some(NodeStatus::Success) {
                return Err(JobError::Failed(format!(
                    "GraphJob({}) Failed with Exception message:\n{}",
                    self.id,
                    self.exception_string()
                )));
            }
        }
        Ok(())
    }

    /// Drop pending nodes and ask each running node to stop, once.
    async fn stop_pending(&self, cancel_requested: &mut HashSet<JobId>) {
        let running: Vec<_> = {
            let mut queues = self.queues.lock();
            queues.waiting.clear();
            queues.ready.clear();
            queues
                .running
                .iter()
                .filter(|(id, _)| !cancel_requested.contains(*id))
                .map(|(id, job)| (id.clone(), Arc::clone(job)))
                .collect()
        };
        for (id, job) in running {
            if let Err(e) = job.cancel().await {
                warn!(graph = %self.id, job = %id, error = %e, "failed to cancel running job");
            }
            cancel_requested.insert(id);
        }
    }

    fn reclaim_running(&self) {
        let mut queues = self.queues.lock();
        let running = std::mem::take(&mut queues.running);
        for (id, job) in running {
            let status = self.current_status(&id);
            queues.for_status(status).insert(id, job);
        }
    }

    fn advance_waiting(&self) {
        let mut queues = self.queues.lock();
        let waiting = std::mem::take(&mut queues.waiting);
        for (id, job) in waiting {
            if self.current_status(&id) == NodeStatus::Waiting {
                let next = self.recompute(&id);
                if next == NodeStatus::Waiting {
                    queues.waiting.insert(id, job);
                    continue;
                }
                if self.statuses.claim(id.as_str(), NodeStatus::Waiting, next) {
                    debug!(graph = %self.id, job = %id, to = %next, "node status changed");
                    queues.for_status(next).insert(id, job);
                    continue;
                }
            }
            match self.current_status(&id) {
                // Owned by another graph sharing the status map
                NodeStatus::Ready | NodeStatus::Running => {
                    queues.waiting.insert(id, job);
                }
                other => {
                    queues.for_status(other).insert(id, job);
                }
            }
        }
    }

    /// Status implied by the dependencies of a waiting node.
    fn recompute(&self, id: &JobId) -> NodeStatus {
        let dependencies = self.dependencies.lock();
        let Some(deps) = dependencies.get(id) else {
            return NodeStatus::Ready;
        };

        let mut failed = false;
        let mut pending = false;
        for dep in deps {
            match self.current_status(&JobId::new(dep.id())) {
                NodeStatus::Failed | NodeStatus::DependentFailed => {
                    failed = true;
                    error!(graph = %self.id, job = %id, dependency = dep.id(), "failing as dependent job failed");
                    self.exception.lock().push_str(&format!(
                        "Job:{} Failing as Dependent Job {} failed\n",
                        id,
                        dep.id()
                    ));
                }
                NodeStatus::Waiting | NodeStatus::Ready | NodeStatus::Running => pending = true,
                NodeStatus::Success => {}
            }
        }

        if failed {
            NodeStatus::DependentFailed
        } else if pending {
            NodeStatus::Waiting
        } else {
            NodeStatus::Ready
        }
    }

    fn dispatch_ready(&self) {
        let mut queues = self.queues.lock();
        let ready = std::mem::take(&mut queues.ready);
        for (id, job) in ready {
            // A node only leaves Ready once it holds a worker slot
            let slot = match &self.limiter {
                Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        queues.ready.insert(id, job);
                        continue;
                    }
                },
                None => None,
            };
            if self.statuses.claim(id.as_str(), NodeStatus::Ready, NodeStatus::Running) {
                info!(graph = %self.id, job = %id, "starting sub-job");
                self.spawn_worker(Arc::clone(&job), slot);
            }
            let status = self.current_status(&id);
            queues.for_status(status).insert(id, job);
        }
    }

    fn spawn_worker(&self, job: Arc<dyn Job>, slot: Option<OwnedSemaphorePermit>) {
        let worker = Worker {
            graph: self.id.clone(),
            statuses: Arc::clone(&self.statuses),
            descriptors: self.descriptors.clone(),
            completed: Arc::clone(&self.completed),
        };
        tokio::spawn(worker.run(job, slot));
    }

    fn current_status(&self, id: &JobId) -> NodeStatus {
        self.statuses.insert_if_absent(id.as_str(), NodeStatus::Waiting)
    }

    fn request_stop(&self) {
        let mut state = self.state.lock();
        if matches!(*state, GraphState::Ready | GraphState::Running) {
            *state = GraphState::Stopping;
            info!(graph = %self.id, "job graph cancellation requested");
        }
        drop(state);
        self.completed.notify_one();
    }
}

/// Everything a worker task needs, detached from the graph's lifetime.
struct Worker {
    graph: String,
    statuses: Arc<JobStatusMap>,
    descriptors: Option<Arc<HashMap<JobId, Arc<dyn JobDescriptor>>>>,
    completed: Arc<Notify>,
}

impl Worker {
    /// Runs `job` holding `slot`, which is given back before the coordinator
    /// is told the node finished.
    async fn run(self, job: Arc<dyn Job>, slot: Option<OwnedSemaphorePermit>) {
        let id = job.id().to_string();
        let (status, panic) = self.execute(&id, job).await;
        drop(slot);
        self.finish(&id, status);
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
    }

    async fn execute(
        &self,
        id: &str,
        job: Arc<dyn Job>,
    ) -> (NodeStatus, Option<Box<dyn Any + Send + 'static>>) {
        if let Err(e) = self.prepare(id) {
            error!(graph = %self.graph, job = %id, error = %e, "could not prepare job");
            return (NodeStatus::Failed, None);
        }

        match tokio::spawn(async move { job.run().await }).await {
            Ok(Ok(())) => {
                info!(graph = %self.graph, job = %id, "job is complete");
                (NodeStatus::Success, None)
            }
            Ok(Err(e)) => {
                error!(graph = %self.graph, job = %id, error = %e, "error in job");
                (NodeStatus::Failed, None)
            }
            Err(e) if e.is_panic() => {
                error!(graph = %self.graph, job = %id, "job panicked");
                (NodeStatus::Failed, Some(e.into_panic()))
            }
            Err(e) => {
                error!(graph = %self.graph, job = %id, error = %e, "job task aborted");
                (NodeStatus::Failed, None)
            }
        }
    }

    fn prepare(&self, id: &str) -> Result<(), JobError> {
        let Some(descriptors) = &self.descriptors else {
            return Ok(());
        };
        match descriptors.get(id) {
            Some(descriptor) => descriptor.prepare(),
            None => Err(JobError::Failed(format!(
                "no descriptor was found for sub-job {}",
                id
            ))),
        }
    }

    fn finish(&self, id: &str, status: NodeStatus) {
        let previous = self.statuses.set(id, status);
        debug!(graph = %self.graph, job = id, ?previous, to = %status, "node status changed");
        self.completed.notify_one();
    }
}

#[async_trait]
impl Job for JobGraph {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<(), JobError> {
        self.execute().await
    }

    /// Stop dispatching, drop pending nodes and cancel running ones. `run()`
    /// returns once the running nodes have finished.
    async fn cancel(&self) -> Result<(), JobError> {
        self.request_stop();
        Ok(())
    }

    /// Finished nodes count fully, unfinished ones by their own progress.
    /// An empty graph reports `1.0`.
    fn progress(&self) -> f64 {
        let (done, active): (usize, Vec<Arc<dyn Job>>) = {
            let queues = self.queues.lock();
            (
                queues.successful.len() + queues.failed.len(),
                queues
                    .waiting
                    .values()
                    .chain(queues.ready.values())
                    .chain(queues.running.values())
                    .cloned()
                    .collect(),
            )
        };
        let total = done + active.len();
        if total == 0 {
            return 1.0;
        }
        let partial: f64 = active.iter().map(|job| job.progress()).sum();
        (done as f64 + partial) / total as f64
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
