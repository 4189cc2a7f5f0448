// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::TimeUnit;

#[yare::parameterized(
    nanos   = { TimeUnit::Nanoseconds,  1_500,       1_500_000_000 },
    micros  = { TimeUnit::Microseconds, 1_500,       1_500_000 },
    millis  = { TimeUnit::Milliseconds, 1_500,       1_500 },
    seconds = { TimeUnit::Seconds,      1_500,       1 },
    minutes = { TimeUnit::Minutes,      179_999,     2 },
    hours   = { TimeUnit::Hours,        7_200_000,   2 },
    days    = { TimeUnit::Days,         172_800_000, 2 },
)]
fn converts_millis(unit: TimeUnit, ms: i64, expected: i64) {
    assert_eq!(unit.convert_millis(ms), expected);
}

#[test]
fn default_unit_is_millis() {
    assert_eq!(TimeUnit::default(), TimeUnit::Milliseconds);
}
