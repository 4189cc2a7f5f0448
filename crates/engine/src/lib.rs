// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskweave execution engine: job decorators, the dependency-graph
//! executor and the schedule manager

mod error;
mod graph;
mod manager;
mod retrying;
mod scheduler;
mod status_map;
mod throttled;

pub use error::SchedulerError;
pub use graph::{GraphConfig, GraphState, JobGraph, DEFAULT_POLL_INTERVAL};
pub use manager::{ScheduleManager, SchedulerConfig, DEFAULT_IDLE_TIMEOUT};
pub use retrying::RetryingJob;
pub use scheduler::ScheduleQueue;
pub use status_map::JobStatusMap;
pub use throttled::ResourceThrottledJob;
