// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

fn args(list: &[&str]) -> impl Iterator<Item = String> {
    list.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .into_iter()
}

#[yare::parameterized(
    none          = { &[], Command::Run },
    version_long  = { &["--version"], Command::Version },
    version_short = { &["-v"], Command::Version },
    version_cap   = { &["-V"], Command::Version },
    help_long     = { &["--help"], Command::Help },
    help_short    = { &["-h"], Command::Help },
    help_word     = { &["help"], Command::Help },
    unknown       = { &["--daemonize"], Command::Unknown("--daemonize".to_string()) },
)]
fn parses_arguments(list: &[&str], expected: Command) {
    assert_eq!(parse_args(args(list)), expected);
}

#[test]
fn startup_marker_appends_to_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_state_dir(dir.path().join("state"));

    write_startup_marker(&config).unwrap();
    write_startup_marker(&config).unwrap();

    let log = std::fs::read_to_string(&config.log_path).unwrap();
    let markers: Vec<_> = log
        .lines()
        .filter(|l| l.starts_with(STARTUP_MARKER_PREFIX))
        .collect();
    assert_eq!(markers.len(), 2);
    assert!(markers[0].ends_with(&format!("{})", std::process::id())));
}

#[test]
fn startup_error_is_written_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_state_dir(dir.path().to_path_buf());

    write_startup_error(&config, &LifecycleError::NoStateDir);

    let log = std::fs::read_to_string(&config.log_path).unwrap();
    assert_eq!(
        log,
        "ERROR Failed to start daemon: Could not determine state directory\n"
    );
}

#[test]
fn startup_error_without_log_dir_is_ignored() {
    let config = Config::for_state_dir(PathBuf::from("/nonexistent/tw-state"));
    write_startup_error(&config, &LifecycleError::NoStateDir);
    assert!(!config.log_path.exists());
}
