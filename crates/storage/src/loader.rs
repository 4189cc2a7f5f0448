// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule file with a single backup.
//!
//! Saving moves the current file aside to the backup path before writing, so
//! a crash mid-save leaves the previous schedule recoverable. Loading falls
//! back to the backup when the main file is missing.

use crate::entry::{ScheduleEntry, ScheduleFile};
use crate::legacy;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tw_core::{LoadError, ScheduleLoader, ScheduledJob};

pub const SCHEDULE_FILE_NAME: &str = "schedule.json";
pub const BACKUP_FILE_NAME: &str = "schedule.json.bak";

#[derive(Debug, Clone)]
pub struct LocalFileScheduleLoader {
    path: PathBuf,
    backup_path: PathBuf,
}

impl LocalFileScheduleLoader {
    pub fn new(path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_path: backup_path.into(),
        }
    }

    /// Loader for `schedule.json` and `schedule.json.bak` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SCHEDULE_FILE_NAME), dir.join(BACKUP_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    fn read(&self) -> Result<Vec<ScheduledJob>, LoadError> {
        let text = fs::read_to_string(&self.path)?;

        if text.trim_start().starts_with('{') {
            let file: ScheduleFile = serde_json::from_str(&text)?;
            let jobs = file
                .schedule
                .into_iter()
                .map(ScheduleEntry::into_job)
                .collect::<Result<Vec<_>, _>>()?;
            debug!(path = %self.path.display(), jobs = jobs.len(), "read schedule file");
            return Ok(jobs);
        }

        info!(path = %self.path.display(), "reading legacy schedule file");
        let jobs = legacy::parse(&text)
            .into_iter()
            .filter_map(|entry| match entry.into_job() {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(error = %e, "skipping legacy schedule entry");
                    None
                }
            })
            .collect();
        Ok(jobs)
    }

    fn write(&self, schedule: &[ScheduledJob]) -> Result<(), LoadError> {
        let document = ScheduleFile {
            schedule: schedule.iter().map(ScheduleEntry::from).collect(),
        };
        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            let mut serializer =
                serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
            document.serialize(&mut serializer)?;
            writer.write_all(b"\n")?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl ScheduleLoader for LocalFileScheduleLoader {
    fn load_schedule(&self) -> Result<Vec<ScheduledJob>, LoadError> {
        if self.path.exists() {
            return self.read();
        }
        if self.backup_path.exists() {
            warn!(
                path = %self.path.display(),
                backup = %self.backup_path.display(),
                "schedule file missing, restoring backup",
            );
            fs::rename(&self.backup_path, &self.path)?;
            return self.read();
        }
        warn!(path = %self.path.display(), "no schedule files found");
        Ok(Vec::new())
    }

    fn save_schedule(&self, schedule: &[ScheduledJob]) -> Result<(), LoadError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            if self.backup_path.exists() {
                fs::remove_file(&self.backup_path)?;
            }
            fs::rename(&self.path, &self.backup_path)?;
        }
        self.write(schedule)?;
        debug!(path = %self.path.display(), jobs = schedule.len(), "saved schedule");
        Ok(())
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
