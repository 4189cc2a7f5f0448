// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! taskweave daemon (twd)
//!
//! Background process that owns the persisted schedule and fires jobs at
//! their time.
//!
//! Architecture:
//! - Scheduler: coordinator task that pops due entries and hands them to
//!   the executor
//! - Executor: runs fired jobs under a shared permit pool
//! - Main task: waits for SIGTERM/SIGINT, then shuts both down

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod env;
mod executor;
mod lifecycle;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::lifecycle::{Config, LifecycleError};

/// Prefix of the line appended to the log file on every start.
pub const STARTUP_MARKER_PREFIX: &str = "--- twd: starting (pid: ";

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    Version,
    Help,
    Unknown(String),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Command {
    match args.next() {
        None => Command::Run,
        Some(arg) => match arg.as_str() {
            "--version" | "-V" | "-v" => Command::Version,
            "--help" | "-h" | "help" => Command::Help,
            _ => Command::Unknown(arg),
        },
    }
}

fn print_help() {
    println!("twd {VERSION}");
    println!("taskweave daemon - fires scheduled jobs from the persisted schedule");
    println!();
    println!("USAGE:");
    println!("    twd");
    println!();
    println!("ENVIRONMENT:");
    println!("    TW_STATE_DIR           State directory (default ~/.local/state/taskweave)");
    println!("    TW_SCHEDULER_IDLE_MS   Longest scheduler sleep between checks");
    println!("    TW_PERMITS             Fired jobs allowed to run at once");
    println!("    RUST_LOG               Log filter (default info)");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    match parse_args(std::env::args().skip(1)) {
        Command::Run => {}
        Command::Version => {
            println!("twd {VERSION}");
            return Ok(());
        }
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Unknown(arg) => {
            eprintln!("error: unexpected argument '{arg}'");
            eprintln!("Usage: twd [--help | --version]");
            std::process::exit(1);
        }
    }

    let config = Config::load()?;

    // Written before tracing is set up so it lands ahead of any log output
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!("Starting taskweave daemon");

    let daemon = match lifecycle::startup(&config) {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("twd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Tracing is non-blocking and may not flush before exit
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        schedule = %config.schedule_path.display(),
        permits = daemon.executor.available_permits(),
        "Daemon ready",
    );
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    if let Err(e) = daemon.shutdown().await {
        error!("Failed to shut down cleanly: {}", e);
    }
    info!("Daemon exited");
    drop(log_guard);
    Ok(())
}

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{})", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config.log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(
        dir,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
