// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: TW_STATE_DIR > XDG_STATE_HOME/taskweave >
/// ~/.local/state/taskweave
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("TW_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("taskweave"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/taskweave"))
}

/// Scheduler idle re-check override
pub fn scheduler_idle_timeout() -> Option<Duration> {
    std::env::var("TW_SCHEDULER_IDLE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
}

/// Concurrent fired-job limit override
pub fn permits() -> Option<u32> {
    std::env::var("TW_PERMITS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
