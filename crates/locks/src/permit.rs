// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named, fixed-capacity permit pools.

use crate::lock::{LockError, LockPrimitive, TimedLock};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tw_core::{Clock, SystemClock};

/// Takes `desired` permits from a shared pool at once.
///
/// The pool is FIFO-fair: a large request at the head of the queue holds back
/// smaller ones behind it. Asking for more than the pool's total blocks
/// until interrupted.
pub struct Permit {
    name: String,
    pool: Arc<Semaphore>,
    desired: u32,
    total: u32,
}

#[async_trait]
impl LockPrimitive for Permit {
    type Guard = OwnedSemaphorePermit;

    async fn lock(&self, interrupt: &CancellationToken) -> Result<Self::Guard, LockError> {
        tokio::select! {
            biased;
            _ = interrupt.cancelled() => Err(LockError::Interrupted(self.to_string())),
            permit = Arc::clone(&self.pool).acquire_many_owned(self.desired) => {
                permit.map_err(|_| LockError::Closed(self.to_string()))
            }
        }
    }

    async fn unlock(&self, guard: Self::Guard) {
        drop(guard);
    }
}

impl fmt::Display for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permit:{} NumPermits:{}", self.name, self.desired)
    }
}

/// Lock on a number of permits from a named pool.
pub type PermitLock<C = SystemClock> = TimedLock<Permit, C>;

impl<C: Clock> TimedLock<Permit, C> {
    pub fn desired_permits(&self) -> u32 {
        self.primitive().desired
    }

    /// Capacity of the pool this handle draws from.
    pub fn total_permits(&self) -> u32 {
        self.primitive().total
    }

    pub fn permit_name(&self) -> &str {
        &self.primitive().name
    }
}

struct Pool {
    semaphore: Arc<Semaphore>,
    total: u32,
}

/// Registry of named permit pools.
pub struct NamedPermitManager<C: Clock = SystemClock> {
    clock: C,
    pools: Mutex<HashMap<String, Pool>>,
}

impl Default for NamedPermitManager<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl NamedPermitManager<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> NamedPermitManager<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pool of `total` permits under `name`.
    ///
    /// Registering a name again replaces its pool; handles already issued
    /// keep drawing from the old one.
    pub fn create_named_permit(&self, name: &str, total: u32) {
        let pool = Pool {
            semaphore: Arc::new(Semaphore::new(total as usize)),
            total,
        };
        if self.pools.lock().insert(name.to_string(), pool).is_some() {
            tracing::warn!(permit = name, total, "replaced existing permit pool");
        } else {
            tracing::debug!(permit = name, total, "created permit pool");
        }
    }

    /// A fresh handle for `desired` permits from `name`, or `None` for an
    /// unknown pool.
    pub fn named_permit(&self, name: &str, desired: u32) -> Option<PermitLock<C>> {
        let pools = self.pools.lock();
        let pool = pools.get(name)?;
        Some(TimedLock::with_clock(
            Permit {
                name: name.to_string(),
                pool: Arc::clone(&pool.semaphore),
                desired,
                total: pool.total,
            },
            self.clock.clone(),
        ))
    }

    /// Permits currently free in `name`.
    pub fn available_permits(&self, name: &str) -> Option<usize> {
        self.pools
            .lock()
            .get(name)
            .map(|p| p.semaphore.available_permits())
    }
}

#[cfg(test)]
#[path = "permit_tests.rs"]
mod tests;
