// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk form of a scheduled job.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tw_core::{LoadError, Period, ScheduledJob};

/// Wall-clock time in the entry's time zone, millisecond precision.
pub(crate) const TIME_FORMAT: &str = "%Y-%m-%d.%H.%M.%S%.3f";

/// Accepts any number of fractional digits, or none.
const TIME_PARSE_FORMAT: &str = "%Y-%m-%d.%H.%M.%S%.f";

/// Top-level document of the JSON schedule file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ScheduleFile {
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleEntry {
    pub id: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub ignore_dependency: bool,
}

impl From<&ScheduledJob> for ScheduleEntry {
    fn from(job: &ScheduledJob) -> Self {
        let at = job.next_execution();
        Self {
            id: job.id().to_string(),
            time: at.format(TIME_FORMAT).to_string(),
            timezone: Some(at.timezone().name().to_string()),
            recurrence: Some(Period::to_code(job.period())),
            ignore_dependency: job.ignore_dependency(),
        }
    }
}

impl ScheduleEntry {
    pub fn into_job(self) -> Result<ScheduledJob, LoadError> {
        let invalid = |message: String| LoadError::InvalidEntry {
            id: self.id.clone(),
            message,
        };

        let tz = match &self.timezone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| invalid(format!("unknown timezone '{}'", name)))?,
            None => Tz::UTC,
        };
        let local = NaiveDateTime::parse_from_str(self.time.trim(), TIME_PARSE_FORMAT)
            .map_err(|e| invalid(format!("bad time '{}': {}", self.time, e)))?;
        // Ambiguous times take the earlier instant
        let at = tz
            .from_local_datetime(&local)
            .earliest()
            .ok_or_else(|| invalid(format!("time '{}' does not exist in {}", self.time, tz.name())))?;
        let period = match &self.recurrence {
            Some(code) => Period::parse_code(code)?,
            None => None,
        };

        Ok(ScheduledJob::new(
            self.id.as_str(),
            at,
            period,
            self.ignore_dependency,
        ))
    }
}
