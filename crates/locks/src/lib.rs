// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tw-locks: timed, interruptible locks for throttling jobs against shared
//! resources

mod group;
mod lock;
mod permit;
mod rw;

pub use group::{GroupLock, SubLocks};
pub use lock::{JobLock, LockError, LockPrimitive, LockStatus, TimedLock};
pub use permit::{NamedPermitManager, Permit, PermitLock};
pub use rw::{ReadWriteLockManager, ReadWriteResourceLock, ResourceGuard, ResourceLock};
