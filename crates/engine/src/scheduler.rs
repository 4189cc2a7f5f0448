// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered set of scheduled jobs

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tw_core::{JobId, ScheduledJob};

/// Scheduled jobs keyed by id and ordered by next execution time.
///
/// Exactly one entry per id. Ties on time are broken by id so iteration is
/// deterministic.
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    order: BTreeSet<(DateTime<Utc>, JobId)>,
    jobs: HashMap<JobId, ScheduledJob>,
}

fn key(job: &ScheduledJob) -> (DateTime<Utc>, JobId) {
    (job.next_execution().with_timezone(&Utc), job.id().clone())
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job`, replacing any entry with the same id.
    pub fn insert(&mut self, job: ScheduledJob) -> Option<ScheduledJob> {
        let replaced = self.remove(job.id().as_str());
        self.order.insert(key(&job));
        self.jobs.insert(job.id().clone(), job);
        replaced
    }

    pub fn remove(&mut self, id: &str) -> Option<ScheduledJob> {
        let job = self.jobs.remove(id)?;
        self.order.remove(&key(&job));
        Some(job)
    }

    /// Remove and return the earliest job if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<ScheduledJob> {
        let (at, id) = self.order.first()?.clone();
        if at > now {
            return None;
        }
        self.remove(id.as_str())
    }

    /// Fire time of the earliest job.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.order.first().map(|(at, _)| *at)
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledJob> {
        self.jobs.get(id)
    }

    /// Snapshot in firing order.
    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.order
            .iter()
            .filter_map(|(_, id)| self.jobs.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
