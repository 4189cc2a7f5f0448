// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the schedule manager

use thiserror::Error;
use tw_core::{LoadError, ScheduleError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to load schedule: {0}")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
