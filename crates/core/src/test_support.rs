// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::executor::{ExecuteError, JobExecutor, LoadError, ScheduleLoader};
use crate::job::{Job, JobError};
use crate::schedule::ScheduledJob;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Ordered record of `start:<id>` / `end:<id>` events shared between jobs.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Tracks how many jobs sharing this gauge run at the same time.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeJobState {
    id: String,
    outcomes: Mutex<VecDeque<Result<(), JobError>>>,
    runs: AtomicUsize,
    cancels: AtomicUsize,
    delay: Duration,
    cancellable: bool,
    panics: bool,
    progress: Mutex<f64>,
    cancelled: Notify,
    is_cancelled: AtomicBool,
    log: Option<EventLog>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

/// Scriptable job for tests.
///
/// Each run pops the next scripted outcome (success once the script is
/// exhausted), optionally sleeping first. Clones share state so a test can
/// keep a handle after giving the job away.
#[derive(Clone)]
pub struct FakeJob {
    state: Arc<FakeJobState>,
}

/// Builder for [`FakeJob`].
pub struct FakeJobBuilder {
    id: String,
    outcomes: VecDeque<Result<(), JobError>>,
    delay: Duration,
    cancellable: bool,
    panics: bool,
    log: Option<EventLog>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl FakeJobBuilder {
    /// Queue one failing run.
    pub fn fail(mut self, message: &str) -> Self {
        self.outcomes.push_back(Err(JobError::failed(message)));
        self
    }

    /// Queue `n` failing runs.
    pub fn fail_times(mut self, n: usize) -> Self {
        for i in 0..n {
            self.outcomes
                .push_back(Err(JobError::failed(format!("scripted failure {}", i + 1))));
        }
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Accept `cancel()` and cut the delay short when it arrives.
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    pub fn panics(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn log(mut self, log: &EventLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    pub fn gauge(mut self, gauge: &Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(Arc::clone(gauge));
        self
    }

    pub fn build(self) -> FakeJob {
        FakeJob {
            state: Arc::new(FakeJobState {
                id: self.id,
                outcomes: Mutex::new(self.outcomes),
                runs: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                delay: self.delay,
                cancellable: self.cancellable,
                panics: self.panics,
                progress: Mutex::new(0.0),
                cancelled: Notify::new(),
                is_cancelled: AtomicBool::new(false),
                log: self.log,
                gauge: self.gauge,
            }),
        }
    }
}

impl FakeJob {
    pub fn builder(id: &str) -> FakeJobBuilder {
        FakeJobBuilder {
            id: id.to_string(),
            outcomes: VecDeque::new(),
            delay: Duration::ZERO,
            cancellable: false,
            panics: false,
            log: None,
            gauge: None,
        }
    }

    /// A job that always succeeds immediately.
    pub fn ok(id: &str) -> Self {
        Self::builder(id).build()
    }

    /// A job that fails on its first run.
    pub fn failing(id: &str) -> Self {
        Self::builder(id).fail("scripted failure").build()
    }

    pub fn runs(&self) -> usize {
        self.state.runs.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    pub fn set_progress(&self, progress: f64) {
        *self.state.progress.lock() = progress;
    }

    fn record(&self, event: &str) {
        if let Some(log) = &self.state.log {
            log.lock().push(format!("{}:{}", event, self.state.id));
        }
    }
}

#[async_trait]
impl Job for FakeJob {
    fn id(&self) -> &str {
        &self.state.id
    }

    #[allow(clippy::panic)]
    async fn run(&self) -> Result<(), JobError> {
        self.state.runs.fetch_add(1, Ordering::SeqCst);
        self.record("start");
        if let Some(gauge) = &self.state.gauge {
            gauge.enter();
        }

        if !self.state.delay.is_zero() {
            if self.state.cancellable {
                tokio::select! {
                    _ = tokio::time::sleep(self.state.delay) => {}
                    _ = self.state.cancelled.notified() => {}
                }
            } else {
                tokio::time::sleep(self.state.delay).await;
            }
        }

        if let Some(gauge) = &self.state.gauge {
            gauge.exit();
        }
        self.record("end");

        if self.state.panics {
            panic!("scripted panic in {}", self.state.id);
        }
        if self.state.is_cancelled.load(Ordering::SeqCst) {
            return Err(JobError::Cancelled(self.state.id.clone()));
        }
        self.state.outcomes.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn cancel(&self) -> Result<(), JobError> {
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
        if !self.state.cancellable {
            return Err(JobError::CancelUnsupported(self.state.id.clone()));
        }
        self.state.is_cancelled.store(true, Ordering::SeqCst);
        self.state.cancelled.notify_waiters();
        Ok(())
    }

    fn progress(&self) -> f64 {
        *self.state.progress.lock()
    }
}

/// One recorded call to [`RecordingExecutor::execute`].
#[derive(Debug, Clone)]
pub struct ExecuteCall {
    pub job_id: String,
    pub ignore_dependency: bool,
    pub at: Instant,
}

/// Execution callback that records every fire.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<ExecuteCall>>>,
    fail_with: Option<String>,
    fired: Arc<Notify>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor whose every call returns an error (after recording).
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ExecuteCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, job_id: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.job_id == job_id).count()
    }

    /// Wait until at least `n` calls have been recorded or `timeout` passes.
    pub async fn wait_for_calls(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.fired.notified();
            if self.calls.lock().len() >= n {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.calls.lock().len() >= n;
            }
        }
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn execute(&self, job_id: &str, ignore_dependency: bool) -> Result<(), ExecuteError> {
        self.calls.lock().push(ExecuteCall {
            job_id: job_id.to_string(),
            ignore_dependency,
            at: Instant::now(),
        });
        self.fired.notify_waiters();
        match &self.fail_with {
            Some(message) => Err(ExecuteError::Failed {
                id: job_id.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// In-memory schedule persistence.
#[derive(Clone, Default)]
pub struct MemoryLoader {
    initial: Arc<Mutex<Vec<ScheduledJob>>>,
    saves: Arc<Mutex<Vec<Vec<ScheduledJob>>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            initial: Arc::new(Mutex::new(jobs)),
            saves: Arc::default(),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().len()
    }

    pub fn last_saved(&self) -> Option<Vec<ScheduledJob>> {
        self.saves.lock().last().cloned()
    }
}

impl ScheduleLoader for MemoryLoader {
    fn load_schedule(&self) -> Result<Vec<ScheduledJob>, LoadError> {
        Ok(self.initial.lock().clone())
    }

    fn save_schedule(&self, schedule: &[ScheduledJob]) -> Result<(), LoadError> {
        self.saves.lock().push(schedule.to_vec());
        Ok(())
    }
}
