// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use thiserror::Error;
use tracing::{info, warn};
use tw_core::JobExecutor;
use tw_engine::{ScheduleManager, SchedulerConfig, SchedulerError};
use tw_storage::{LocalFileScheduleLoader, BACKUP_FILE_NAME, SCHEDULE_FILE_NAME};

use crate::env;
use crate::executor::{TracingExecutor, DEFAULT_PERMITS};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/taskweave)
    pub state_dir: PathBuf,
    pub schedule_path: PathBuf,
    pub backup_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub scheduler: SchedulerConfig,
    /// How many fired jobs may run at once
    pub permits: u32,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        let mut config = Self::for_state_dir(env::state_dir()?);
        if let Some(idle) = env::scheduler_idle_timeout() {
            config.scheduler.idle_timeout = idle;
        }
        if let Some(permits) = env::permits() {
            config.permits = permits;
        }
        Ok(config)
    }

    /// Default configuration with every file under `state_dir`.
    pub fn for_state_dir(state_dir: PathBuf) -> Self {
        Self {
            schedule_path: state_dir.join(SCHEDULE_FILE_NAME),
            backup_path: state_dir.join(BACKUP_FILE_NAME),
            lock_path: state_dir.join("twd.pid"),
            log_path: state_dir.join("twd.log"),
            scheduler: SchedulerConfig::default(),
            permits: DEFAULT_PERMITS,
            state_dir,
        }
    }
}

/// A running daemon.
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub manager: ScheduleManager,
    pub executor: Arc<TracingExecutor>,
    pub start_time: Instant,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Take the pid lock, load the schedule and start the scheduler.
///
/// Must run inside a tokio runtime.
pub fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    match startup_inner(config) {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // The pid file belongs to the running daemon when locking failed
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

fn startup_inner(config: &Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Open without truncating so a running daemon's pid survives a failed lock
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    let loader = LocalFileScheduleLoader::new(&config.schedule_path, &config.backup_path);
    let executor = Arc::new(TracingExecutor::new(config.permits));
    let manager = ScheduleManager::start(
        Arc::clone(&executor) as Arc<dyn JobExecutor>,
        Arc::new(loader),
        config.scheduler.clone(),
    )?;

    info!(
        state_dir = %config.state_dir.display(),
        jobs = manager.scheduled_jobs().len(),
        permits = config.permits,
        "daemon started",
    );

    Ok(Daemon {
        config: config.clone(),
        lock_file,
        manager,
        executor,
        start_time: Instant::now(),
    })
}

fn cleanup_on_failure(config: &Config) {
    if let Err(e) = std::fs::remove_file(&config.lock_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %config.lock_path.display(), error = %e, "failed to remove pid file");
        }
    }
}

impl Daemon {
    /// Stop the scheduler, cancel fired jobs and release the pid lock.
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        self.manager.shutdown().await;
        let running = self.executor.running();
        if !running.is_empty() {
            info!(jobs = ?running, "cancelling fired jobs");
        }
        self.executor.cancel_all().await;

        match std::fs::remove_file(&self.config.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "daemon stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
