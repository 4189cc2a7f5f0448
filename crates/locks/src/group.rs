// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A list of locks taken together.

use crate::lock::{JobLock, LockError, LockPrimitive, TimedLock};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tw_core::{Clock, SystemClock};

/// Ordered sub-locks. Acquired in list order and released in list order.
///
/// If acquiring one of them fails, or the acquisition is dropped, the ones
/// already held are given back in reverse order and return to `Unused`, so
/// an interrupted group holds nothing and can be acquired again.
pub struct SubLocks {
    locks: Vec<Arc<dyn JobLock>>,
}

impl SubLocks {
    pub fn new(locks: impl IntoIterator<Item = Arc<dyn JobLock>>) -> Self {
        Self {
            locks: locks.into_iter().collect(),
        }
    }
}

/// The first `taken` sub-locks of a group acquisition in progress.
struct Rollback<'a> {
    locks: &'a [Arc<dyn JobLock>],
    taken: usize,
}

impl Rollback<'_> {
    async fn run(mut self) {
        let taken = std::mem::take(&mut self.taken);
        for lock in self.locks[..taken].iter().rev() {
            lock.abort_lock().await;
        }
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if self.taken == 0 {
            return;
        }
        let taken: Vec<_> = self.locks[..self.taken].iter().rev().cloned().collect();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    for lock in taken {
                        lock.abort_lock().await;
                    }
                });
            }
            Err(_) => tracing::warn!(held = taken.len(), "dropped group acquisition outside a runtime"),
        }
    }
}

#[async_trait]
impl LockPrimitive for SubLocks {
    type Guard = ();

    async fn lock(&self, interrupt: &CancellationToken) -> Result<(), LockError> {
        let mut rollback = Rollback {
            locks: &self.locks,
            taken: 0,
        };
        for lock in &self.locks {
            if let Err(e) = lock.acquire_lock(interrupt).await {
                tracing::info!(
                    failed = %lock,
                    released = rollback.taken,
                    "group lock acquisition rolled back",
                );
                rollback.run().await;
                return Err(e);
            }
            rollback.taken += 1;
        }
        rollback.taken = 0;
        Ok(())
    }

    async fn unlock(&self, _guard: ()) {
        for lock in &self.locks {
            lock.release_lock().await;
        }
    }
}

impl fmt::Display for SubLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for lock in &self.locks {
            writeln!(f, "{}", lock)?;
        }
        Ok(())
    }
}

pub type GroupLock<C = SystemClock> = TimedLock<SubLocks, C>;

impl TimedLock<SubLocks, SystemClock> {
    pub fn group(locks: impl IntoIterator<Item = Arc<dyn JobLock>>) -> Self {
        TimedLock::new(SubLocks::new(locks))
    }
}

impl<C: Clock> TimedLock<SubLocks, C> {
    pub fn num_locks(&self) -> usize {
        self.primitive().locks.len()
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
