// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node status shared between job graphs.

use parking_lot::Mutex;
use std::collections::HashMap;
use tw_core::{JobId, NodeStatus};

/// Status of every node known to one or more graphs.
///
/// Graphs that share a map see each other's progress: a node another graph
/// already ran to `Success` is not run again.
#[derive(Debug, Default)]
pub struct JobStatusMap {
    inner: Mutex<HashMap<JobId, NodeStatus>>,
}

impl JobStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<NodeStatus> {
        self.inner.lock().get(id).copied()
    }

    /// Record `status` unless `id` already has one; returns the status in
    /// effect afterwards.
    pub fn insert_if_absent(&self, id: &str, status: NodeStatus) -> NodeStatus {
        *self.inner.lock().entry(JobId::new(id)).or_insert(status)
    }

    /// Unconditionally set the status, returning the previous one.
    pub fn set(&self, id: &str, status: NodeStatus) -> Option<NodeStatus> {
        self.inner.lock().insert(JobId::new(id), status)
    }

    /// Move `id` from `from` to `to` if it is currently `from`.
    pub fn claim(&self, id: &str, from: NodeStatus, to: NodeStatus) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(id) {
            Some(status) if *status == from => {
                *status = to;
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> HashMap<JobId, NodeStatus> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "status_map_tests.rs"]
mod tests;
