// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Schedule persistence for taskweave

mod entry;
mod legacy;
mod loader;

pub use loader::{LocalFileScheduleLoader, BACKUP_FILE_NAME, SCHEDULE_FILE_NAME};
