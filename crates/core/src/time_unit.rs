// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Units for reporting lock timings.

/// Granularity for durations reported in whole units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert a millisecond count into this unit, truncating toward zero.
    pub fn convert_millis(self, ms: i64) -> i64 {
        match self {
            TimeUnit::Nanoseconds => ms.saturating_mul(1_000_000),
            TimeUnit::Microseconds => ms.saturating_mul(1_000),
            TimeUnit::Milliseconds => ms,
            TimeUnit::Seconds => ms / 1_000,
            TimeUnit::Minutes => ms / 60_000,
            TimeUnit::Hours => ms / 3_600_000,
            TimeUnit::Days => ms / 86_400_000,
        }
    }
}

#[cfg(test)]
#[path = "time_unit_tests.rs"]
mod tests;
