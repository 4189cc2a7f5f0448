// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled triggers: one-shot or recurring fire times for a job id.

use crate::job::JobId;
use chrono::{DateTime, Days, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on period additions when catching a recurring job up to now.
pub const MAX_PERIOD_INCREMENTS: u32 = 100_000;

/// Errors from schedule arithmetic and recurrence codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("{increments} increments of period {period} did not get job '{id}' to the present")]
    RunawayPeriod {
        id: String,
        period: Period,
        increments: u32,
    },
    #[error("invalid recurrence '{0}'")]
    InvalidPeriod(String),
    #[error("next execution of job '{0}' is out of range")]
    OutOfRange(String),
}

/// Recurrence interval.
///
/// Day periods keep the local wall-clock time in the job's time zone across
/// DST changes; the others are fixed-length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Days(u32),
    Hours(u32),
    Minutes(u32),
    Seconds(u32),
}

impl Period {
    /// Add one period to `at`. `None` when the result is unrepresentable.
    ///
    /// Day periods land on the same wall-clock time. A time repeated by a
    /// DST fall-back resolves to its earlier instant; a time skipped by a
    /// spring-forward moves ahead by the length of the gap.
    pub fn add_to(self, at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            Period::Days(n) => {
                let local = at.naive_local().checked_add_days(Days::new(u64::from(n)))?;
                resolve_local(at.timezone(), local)
            }
            Period::Hours(n) => at.checked_add_signed(TimeDelta::hours(i64::from(n))),
            Period::Minutes(n) => at.checked_add_signed(TimeDelta::minutes(i64::from(n))),
            Period::Seconds(n) => at.checked_add_signed(TimeDelta::seconds(i64::from(n))),
        }
    }

    /// Parse a recurrence code: `<n>d`, `<n>h`, `<n>m`, `<n>s`, or `n` for
    /// no recurrence.
    pub fn parse_code(code: &str) -> Result<Option<Period>, ScheduleError> {
        let code = code.trim();
        if code == "n" {
            return Ok(None);
        }
        code.parse().map(Some)
    }

    /// Inverse of [`Period::parse_code`].
    pub fn to_code(period: Option<Period>) -> String {
        match period {
            Some(p) => p.to_string(),
            None => "n".to_string(),
        }
    }
}

/// Map a wall-clock time in `tz` to an instant, never failing on DST
/// transitions.
fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    if let Some(resolved) = tz.from_local_datetime(&local).earliest() {
        return Some(resolved);
    }
    // Skipped by a spring-forward: read it with the offset from before the gap
    let before = tz
        .from_local_datetime(&local.checked_sub_days(Days::new(1))?)
        .earliest()?;
    let offset = TimeDelta::seconds(i64::from(before.offset().fix().local_minus_utc()));
    let utc = local.checked_sub_signed(offset)?;
    Some(Utc.from_utc_datetime(&utc).with_timezone(&tz))
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Days(n) => write!(f, "{}d", n),
            Period::Hours(n) => write!(f, "{}h", n),
            Period::Minutes(n) => write!(f, "{}m", n),
            Period::Seconds(n) => write!(f, "{}s", n),
        }
    }
}

impl FromStr for Period {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidPeriod(s.to_string());
        let split = s
            .len()
            .checked_sub(1)
            .filter(|&i| s.is_char_boundary(i))
            .ok_or_else(invalid)?;
        let (num, unit) = s.split_at(split);
        let n: u32 = num.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(invalid());
        }
        match unit {
            "d" => Ok(Period::Days(n)),
            "h" => Ok(Period::Hours(n)),
            "m" => Ok(Period::Minutes(n)),
            "s" => Ok(Period::Seconds(n)),
            _ => Err(invalid()),
        }
    }
}

/// A one-shot or recurring trigger for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    id: JobId,
    next_execution: DateTime<Tz>,
    period: Option<Period>,
    ignore_dependency: bool,
}

impl ScheduledJob {
    pub fn new(
        id: impl Into<JobId>,
        next_execution: DateTime<Tz>,
        period: Option<Period>,
        ignore_dependency: bool,
    ) -> Self {
        Self {
            id: id.into(),
            next_execution,
            period,
            ignore_dependency,
        }
    }

    pub fn one_shot(id: impl Into<JobId>, at: DateTime<Tz>, ignore_dependency: bool) -> Self {
        Self::new(id, at, None, ignore_dependency)
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn next_execution(&self) -> &DateTime<Tz> {
        &self.next_execution
    }

    pub fn period(&self) -> Option<Period> {
        self.period
    }

    pub fn ignore_dependency(&self) -> bool {
        self.ignore_dependency
    }

    pub fn is_recurring(&self) -> bool {
        self.period.is_some()
    }

    /// True once the fire time has been reached.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_execution <= now
    }

    /// Move the fire time past `now` if it has already been reached.
    ///
    /// Returns `Ok(true)` when the job stays scheduled and `Ok(false)` for a
    /// one-shot job whose time has passed.
    pub fn update_time(&mut self, now: DateTime<Utc>) -> Result<bool, ScheduleError> {
        if self.next_execution > now {
            return Ok(true);
        }
        let Some(period) = self.period else {
            return Ok(false);
        };

        let mut next = self.next_execution;
        let mut increments = 0;
        while next <= now {
            if increments >= MAX_PERIOD_INCREMENTS {
                return Err(ScheduleError::RunawayPeriod {
                    id: self.id.to_string(),
                    period,
                    increments,
                });
            }
            next = period
                .add_to(&next)
                .ok_or_else(|| ScheduleError::OutOfRange(self.id.to_string()))?;
            increments += 1;
        }
        self.next_execution = next;
        Ok(true)
    }
}

impl fmt::Display for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.id, self.next_execution.to_rfc3339())?;
        if let Some(period) = self.period {
            write!(f, " every {}", period)?;
        }
        if self.ignore_dependency {
            write!(f, " (ignoring dependencies)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
