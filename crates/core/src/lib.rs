// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tw-core: jobs, schedules and clocks shared by the taskweave crates

pub mod clock;
pub mod executor;
pub mod job;
pub mod schedule;
pub mod time_unit;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use executor::{ExecuteError, JobExecutor, LoadError, ScheduleLoader};
pub use job::{Job, JobDescriptor, JobError, JobId, NodeStatus};
pub use schedule::{Period, ScheduleError, ScheduledJob, MAX_PERIOD_INCREMENTS};
pub use time_unit::TimeUnit;
