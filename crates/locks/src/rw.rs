// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared/exclusive locks keyed by resource name.

use crate::lock::{LockError, LockPrimitive, TimedLock};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tw_core::{Clock, SystemClock};

/// Read or write side of a resource's lock.
pub struct ResourceLock {
    resource: String,
    lock: Arc<RwLock<()>>,
    write: bool,
}

pub enum ResourceGuard {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

#[async_trait]
impl LockPrimitive for ResourceLock {
    type Guard = ResourceGuard;

    async fn lock(&self, interrupt: &CancellationToken) -> Result<Self::Guard, LockError> {
        let lock = Arc::clone(&self.lock);
        if self.write {
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => Err(LockError::Interrupted(self.to_string())),
                guard = lock.write_owned() => Ok(ResourceGuard::Write(guard)),
            }
        } else {
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => Err(LockError::Interrupted(self.to_string())),
                guard = lock.read_owned() => Ok(ResourceGuard::Read(guard)),
            }
        }
    }

    async fn unlock(&self, guard: Self::Guard) {
        drop(guard);
    }
}

impl fmt::Display for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource Lock:{}", self.resource)
    }
}

pub type ReadWriteResourceLock<C = SystemClock> = TimedLock<ResourceLock, C>;

impl<C: Clock> TimedLock<ResourceLock, C> {
    pub fn resource(&self) -> &str {
        &self.primitive().resource
    }

    pub fn is_write(&self) -> bool {
        self.primitive().write
    }
}

/// Hands out read/write handles; every handle for the same resource shares
/// one fair lock.
pub struct ReadWriteLockManager<C: Clock = SystemClock> {
    clock: C,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl Default for ReadWriteLockManager<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadWriteLockManager<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> ReadWriteLockManager<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn read_lock(&self, resource: &str) -> ReadWriteResourceLock<C> {
        self.handle(resource, false)
    }

    pub fn write_lock(&self, resource: &str) -> ReadWriteResourceLock<C> {
        self.handle(resource, true)
    }

    /// Number of distinct resources seen so far.
    pub fn resource_count(&self) -> usize {
        self.locks.lock().len()
    }

    fn handle(&self, resource: &str, write: bool) -> ReadWriteResourceLock<C> {
        let lock = Arc::clone(self.locks.lock().entry(resource.to_string()).or_default());
        TimedLock::with_clock(
            ResourceLock {
                resource: resource.to_string(),
                lock,
                write,
            },
            self.clock.clone(),
        )
    }
}

#[cfg(test)]
#[path = "rw_tests.rs"]
mod tests;
