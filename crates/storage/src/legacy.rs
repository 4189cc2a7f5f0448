// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat-text schedule format that predates the JSON file.
//!
//! One job per line, `<id> = <time> <recurrence> <ignoreDependency>`, with
//! `#` and `!` starting comment lines. Times carry no zone and are read as
//! UTC. Lines that don't fit are skipped with a warning.

use crate::entry::ScheduleEntry;
use tracing::warn;

pub(crate) fn parse(text: &str) -> Vec<ScheduleEntry> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(i + 1, line))
        .collect()
}

fn parse_line(number: usize, line: &str) -> Option<ScheduleEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    let Some((key, value)) = line.split_once('=') else {
        warn!(line = number, "skipping legacy schedule line without '='");
        return None;
    };
    let id = key.trim();
    let pieces: Vec<&str> = value.split_whitespace().collect();
    let [time, recurrence, ignore_dependency] = pieces.as_slice() else {
        warn!(line = number, job = id, "skipping malformed legacy schedule line");
        return None;
    };
    if id.is_empty() {
        warn!(line = number, "skipping legacy schedule line without a job id");
        return None;
    }

    Some(ScheduleEntry {
        id: id.to_string(),
        time: time.to_string(),
        timezone: None,
        recurrence: Some(recurrence.to_string()),
        ignore_dependency: ignore_dependency.eq_ignore_ascii_case("true"),
    })
}
