// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule manager: fires scheduled jobs at their time and hands them to
//! the execution manager.

use crate::error::SchedulerError;
use crate::scheduler::ScheduleQueue;
use chrono::DateTime;
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tw_core::{Clock, JobExecutor, Period, ScheduleLoader, ScheduledJob, SystemClock};

/// Longest the coordinator sleeps without re-checking the schedule.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub idle_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

enum Step {
    Fire(ScheduledJob),
    Wait(Duration),
}

struct Shared<C: Clock> {
    queue: Mutex<ScheduleQueue>,
    /// Serializes saves so the newest snapshot is always written last
    persist_lock: Mutex<()>,
    /// Latest save started by the coordinator
    pending_save: Mutex<Option<JoinHandle<()>>>,
    wake: Notify,
    shutdown: CancellationToken,
    executor: Arc<dyn JobExecutor>,
    loader: Arc<dyn ScheduleLoader>,
    clock: C,
    config: SchedulerConfig,
}

/// Owns the live schedule and the coordinator task that fires it.
///
/// Must be started inside a tokio runtime. Dropping the manager stops the
/// coordinator; [`ScheduleManager::shutdown`] also waits for it.
pub struct ScheduleManager<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleManager<SystemClock> {
    pub fn start(
        executor: Arc<dyn JobExecutor>,
        loader: Arc<dyn ScheduleLoader>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        Self::start_with_clock(executor, loader, config, SystemClock)
    }
}

impl<C: Clock> ScheduleManager<C> {
    /// Load the persisted schedule and start the coordinator.
    ///
    /// Recurring jobs whose time has passed are moved to their next
    /// occurrence; one-shot jobs whose time has passed are dropped.
    pub fn start_with_clock(
        executor: Arc<dyn JobExecutor>,
        loader: Arc<dyn ScheduleLoader>,
        config: SchedulerConfig,
        clock: C,
    ) -> Result<Self, SchedulerError> {
        let loaded = loader.load_schedule()?;
        let now = clock.utc_now();
        let mut queue = ScheduleQueue::new();
        for mut job in loaded {
            match job.update_time(now) {
                Ok(true) => {
                    queue.insert(job);
                }
                Ok(false) => info!(job = %job, "dropping expired one-shot job"),
                Err(e) => warn!(job = %job.id(), error = %e, "dropping job with unusable period"),
            }
        }
        info!(jobs = queue.len(), "loaded schedule");

        let shared = Arc::new(Shared {
            queue: Mutex::new(queue),
            persist_lock: Mutex::new(()),
            pending_save: Mutex::new(None),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            executor,
            loader,
            clock,
            config,
        });
        let coordinator = tokio::spawn(Arc::clone(&shared).run());

        Ok(Self {
            shared,
            coordinator: Mutex::new(Some(coordinator)),
        })
    }

    /// Schedule `id` at `time`, recurring every `period` if given.
    pub fn schedule(
        &self,
        id: &str,
        time: DateTime<Tz>,
        period: Option<Period>,
        ignore_dependency: bool,
    ) -> Result<(), SchedulerError> {
        self.schedule_job(ScheduledJob::new(id, time, period, ignore_dependency))
    }

    /// Add `job`, replacing any entry with the same id, then persist and wake
    /// the coordinator.
    ///
    /// A recurring job whose time has passed is moved to its next occurrence;
    /// a one-shot job whose time has passed fires right away.
    pub fn schedule_job(&self, mut job: ScheduledJob) -> Result<(), SchedulerError> {
        if job.is_recurring() {
            job.update_time(self.shared.clock.utc_now())?;
        }
        info!(job = %job, "adding job to schedule");
        if let Some(old) = self.shared.queue.lock().insert(job) {
            debug!(job = %old, "replaced scheduled job");
        }
        self.shared.persist();
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Remove `id` from the schedule and persist. The coordinator is not
    /// woken; a removed head entry is simply never fired.
    pub fn remove_scheduled_job(&self, id: &str) -> Option<ScheduledJob> {
        let removed = self.shared.queue.lock().remove(id)?;
        info!(job = %removed, "removing job from schedule");
        self.shared.persist();
        Some(removed)
    }

    /// Snapshot of the schedule in firing order.
    pub fn scheduled_jobs(&self) -> Vec<ScheduledJob> {
        self.shared.queue.lock().jobs()
    }

    pub fn scheduled_job(&self, id: &str) -> Option<ScheduledJob> {
        self.shared.queue.lock().get(id).cloned()
    }

    /// Stop the coordinator and wait for it and its last save to finish.
    /// Callbacks already handed to the executor keep running.
    pub async fn shutdown(&self) {
        info!("shutting down scheduler");
        self.shared.shutdown.cancel();
        let handle = self.coordinator.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler coordinator ended abnormally");
            }
        }
        let save = self.shared.pending_save.lock().take();
        if let Some(save) = save {
            if let Err(e) = save.await {
                error!(error = %e, "schedule save ended abnormally");
            }
        }
    }
}

impl<C: Clock> Drop for ScheduleManager<C> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl<C: Clock> Shared<C> {
    async fn run(self: Arc<Self>) {
        debug!("scheduler coordinator started");
        while !self.shutdown.is_cancelled() {
            let wait = match self.next_step() {
                Step::Fire(job) => {
                    self.fire(job);
                    continue;
                }
                Step::Wait(wait) => wait,
            };
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("scheduler coordinator stopped");
    }

    /// Pop the head entry if it is due, re-inserting its next occurrence in
    /// the same critical section; otherwise how long to wait.
    fn next_step(&self) -> Step {
        let idle = self.config.idle_timeout;
        let now = self.clock.utc_now();
        let mut queue = self.queue.lock();

        let Some(at) = queue.next_deadline() else {
            return Step::Wait(idle);
        };
        if at > now {
            let until = (at - now).to_std().unwrap_or_default();
            return Step::Wait(until.min(idle));
        }
        let Some(job) = queue.pop_due(now) else {
            return Step::Wait(Duration::ZERO);
        };

        let mut next = job.clone();
        match next.update_time(now) {
            Ok(true) => {
                queue.insert(next);
            }
            Ok(false) => {}
            Err(e) => error!(job = %job.id(), error = %e, "not rescheduling job"),
        }
        Step::Fire(job)
    }

    fn fire(self: &Arc<Self>, job: ScheduledJob) {
        info!(job = %job.id(), "scheduler attempting to run job");
        let executor = Arc::clone(&self.executor);
        let id = job.id().to_string();
        let ignore_dependency = job.ignore_dependency();

        tokio::spawn(async move {
            let call_id = id.clone();
            let call = tokio::spawn(async move { executor.execute(&call_id, ignore_dependency).await });
            match call.await {
                Ok(Ok(())) => debug!(job = %id, "job handed to executor"),
                Ok(Err(e)) => info!(job = %id, error = %e, "could not run job"),
                Err(e) => error!(job = %id, error = %e, "executor failed while running job"),
            }
        });

        let shared = Arc::clone(self);
        let save = tokio::task::spawn_blocking(move || shared.persist());
        *self.pending_save.lock() = Some(save);
    }

    /// Write the current schedule. Runs on the caller's thread for API
    /// mutations, so the file is current when they return, and on the
    /// blocking pool for fires.
    fn persist(&self) {
        let _guard = self.persist_lock.lock();
        let jobs = self.queue.lock().jobs();
        if let Err(e) = self.loader.save_schedule(&jobs) {
            error!(error = %e, jobs = jobs.len(), "failed to save schedule");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
