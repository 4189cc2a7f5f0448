// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock handle contract and the timing template shared by every variant.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tw_core::{Clock, SystemClock, TimeUnit};

/// Errors from acquiring a lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("interrupted while acquiring {0}")]
    Interrupted(String),
    #[error("{0} was closed")]
    Closed(String),
}

/// Lifecycle of a single-use lock handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockStatus {
    #[default]
    Unused,
    AcquiringLock,
    AcquiredLock,
    ReleasedLock,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStatus::Unused => write!(f, "unused"),
            LockStatus::AcquiringLock => write!(f, "acquiring"),
            LockStatus::AcquiredLock => write!(f, "acquired"),
            LockStatus::ReleasedLock => write!(f, "released"),
        }
    }
}

/// A lock a job must hold while it runs.
///
/// Handles are single use: `Unused → AcquiringLock → AcquiredLock →
/// ReleasedLock`. Acquiring a handle that has left `Unused` is a no-op, as is
/// releasing one that is not held.
#[async_trait]
pub trait JobLock: fmt::Display + Send + Sync {
    /// Wait until the lock is held.
    ///
    /// When `interrupt` fires first, returns [`LockError::Interrupted`]; no
    /// lock is held afterwards and the handle is back to `Unused`.
    async fn acquire_lock(&self, interrupt: &CancellationToken) -> Result<(), LockError>;

    async fn release_lock(&self);

    /// Give back a held lock without finishing the handle: it returns to
    /// `Unused` with no timing recorded, as if never acquired. No-op unless
    /// the lock is held.
    async fn abort_lock(&self);

    fn status(&self) -> LockStatus;

    /// Time spent waiting for the lock, or `-1` before acquisition started.
    fn lock_acquire_time(&self, unit: TimeUnit) -> i64;

    /// Time the lock has been held, or `-1` before it was acquired.
    fn lock_held_time(&self, unit: TimeUnit) -> i64;

    /// Waiting plus holding time, or `-1` before acquisition started.
    fn total_lock_time(&self, unit: TimeUnit) -> i64;
}

/// The blocking part of a lock variant, wrapped by [`TimedLock`].
#[async_trait]
pub trait LockPrimitive: fmt::Display + Send + Sync + 'static {
    /// Proof of ownership, handed back to `unlock`.
    type Guard: Send + 'static;

    async fn lock(&self, interrupt: &CancellationToken) -> Result<Self::Guard, LockError>;

    async fn unlock(&self, guard: Self::Guard);
}

#[derive(Debug, Default)]
struct Timing {
    status: LockStatus,
    acquire_start_ms: Option<u64>,
    acquire_end_ms: Option<u64>,
    released_ms: Option<u64>,
}

/// Elapsed milliseconds between two timestamps, `-1` when `start` is unset
/// and up to `now` when `end` is unset.
fn elapsed_ms(start: Option<u64>, end: Option<u64>, now: u64) -> i64 {
    match (start, end) {
        (None, _) => -1,
        (Some(start), None) => now.saturating_sub(start) as i64,
        (Some(start), Some(end)) => end.saturating_sub(start) as i64,
    }
}

/// Puts the handle back to `Unused` if an acquisition does not complete,
/// including when the acquiring future is dropped.
struct ResetOnDrop<'a> {
    timing: &'a Mutex<Timing>,
    armed: bool,
}

impl ResetOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.timing.lock() = Timing::default();
        }
    }
}

fn convert(unit: TimeUnit, ms: i64) -> i64 {
    if ms < 0 {
        -1
    } else {
        unit.convert_millis(ms)
    }
}

/// Status and timing bookkeeping around a [`LockPrimitive`].
///
/// Acquire and release are serialized on an async mutex so the status moves
/// forward exactly once; the timing getters read a separate sync mutex and
/// never wait on a pending acquisition.
pub struct TimedLock<P: LockPrimitive, C: Clock = SystemClock> {
    primitive: P,
    clock: C,
    held: tokio::sync::Mutex<Option<P::Guard>>,
    timing: Mutex<Timing>,
}

impl<P: LockPrimitive> TimedLock<P, SystemClock> {
    pub fn new(primitive: P) -> Self {
        Self::with_clock(primitive, SystemClock)
    }
}

impl<P: LockPrimitive, C: Clock> TimedLock<P, C> {
    pub fn with_clock(primitive: P, clock: C) -> Self {
        Self {
            primitive,
            clock,
            held: tokio::sync::Mutex::new(None),
            timing: Mutex::new(Timing::default()),
        }
    }

    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    fn span(&self, pick: impl Fn(&Timing) -> (Option<u64>, Option<u64>), unit: TimeUnit) -> i64 {
        let (start, end) = pick(&self.timing.lock());
        convert(unit, elapsed_ms(start, end, self.clock.epoch_ms()))
    }
}

#[async_trait]
impl<P: LockPrimitive, C: Clock> JobLock for TimedLock<P, C> {
    async fn acquire_lock(&self, interrupt: &CancellationToken) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        {
            let mut timing = self.timing.lock();
            if timing.status != LockStatus::Unused {
                return Ok(());
            }
            timing.status = LockStatus::AcquiringLock;
            timing.acquire_start_ms = Some(self.clock.epoch_ms());
        }

        let reset = ResetOnDrop {
            timing: &self.timing,
            armed: true,
        };
        match self.primitive.lock(interrupt).await {
            Ok(guard) => {
                reset.disarm();
                *held = Some(guard);
                let mut timing = self.timing.lock();
                timing.acquire_end_ms = Some(self.clock.epoch_ms());
                timing.status = LockStatus::AcquiredLock;
                tracing::debug!(lock = %self.primitive, "lock acquired");
                Ok(())
            }
            Err(e) => {
                drop(reset);
                tracing::debug!(lock = %self.primitive, error = %e, "lock acquisition abandoned");
                Err(e)
            }
        }
    }

    async fn release_lock(&self) {
        let mut held = self.held.lock().await;
        let Some(guard) = held.take() else {
            return;
        };
        self.primitive.unlock(guard).await;
        let mut timing = self.timing.lock();
        timing.released_ms = Some(self.clock.epoch_ms());
        timing.status = LockStatus::ReleasedLock;
        tracing::debug!(lock = %self.primitive, "lock released");
    }

    async fn abort_lock(&self) {
        let mut held = self.held.lock().await;
        let Some(guard) = held.take() else {
            return;
        };
        self.primitive.unlock(guard).await;
        *self.timing.lock() = Timing::default();
        tracing::debug!(lock = %self.primitive, "lock given back unused");
    }

    fn status(&self) -> LockStatus {
        self.timing.lock().status
    }

    fn lock_acquire_time(&self, unit: TimeUnit) -> i64 {
        self.span(|t| (t.acquire_start_ms, t.acquire_end_ms), unit)
    }

    fn lock_held_time(&self, unit: TimeUnit) -> i64 {
        self.span(|t| (t.acquire_end_ms, t.released_ms), unit)
    }

    fn total_lock_time(&self, unit: TimeUnit) -> i64 {
        self.span(|t| (t.acquire_start_ms, t.released_ms), unit)
    }
}

impl<P: LockPrimitive, C: Clock> fmt::Display for TimedLock<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.primitive, f)
    }
}

impl<P: LockPrimitive, C: Clock> fmt::Debug for TimedLock<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedLock")
            .field("lock", &self.primitive.to_string())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
