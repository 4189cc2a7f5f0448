//! The schedule survives restarts through the schedule file.

use crate::prelude::*;

use std::sync::Arc;

use chrono::TimeDelta;
use tw_core::test_support::RecordingExecutor;
use tw_core::{Period, ScheduleLoader};
use tw_engine::{ScheduleManager, SchedulerConfig};
use tw_storage::LocalFileScheduleLoader;

fn start(loader: &LocalFileScheduleLoader) -> (ScheduleManager, RecordingExecutor) {
    let executor = RecordingExecutor::new();
    let manager = ScheduleManager::start(
        Arc::new(executor.clone()),
        Arc::new(loader.clone()),
        SchedulerConfig::default(),
    )
    .unwrap();
    (manager, executor)
}

#[tokio::test]
async fn restart_restores_entries_and_advances_recurring_ones() {
    let dir = tempfile::tempdir().unwrap();
    let loader = LocalFileScheduleLoader::in_dir(dir.path());

    let (manager, _) = start(&loader);
    manager
        .schedule("hourly", in_ms(-90 * 60 * 1000), Some(Period::Hours(1)), false)
        .unwrap();
    manager
        .schedule("tomorrow", in_ms(24 * 3600 * 1000), None, true)
        .unwrap();
    manager.shutdown().await;
    drop(manager);

    let (manager, executor) = start(&loader);
    let hourly = manager.scheduled_job("hourly").unwrap();
    assert!(*hourly.next_execution() > chrono::Utc::now());
    assert!(*hourly.next_execution() < chrono::Utc::now() + TimeDelta::hours(1));
    assert!(manager.scheduled_job("tomorrow").unwrap().ignore_dependency());
    assert!(executor.calls().is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn legacy_schedule_is_rewritten_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let loader = LocalFileScheduleLoader::in_dir(dir.path());
    let next_year = (chrono::Utc::now() + TimeDelta::days(365))
        .format("%Y-%m-%d.%H.%M.%S.000")
        .to_string();
    let legacy = format!("# exported\nnightly = {next_year} 1d false\n");
    std::fs::write(loader.path(), &legacy).unwrap();

    let (manager, _) = start(&loader);
    assert!(manager.scheduled_job("nightly").is_some());
    manager
        .schedule("adhoc", in_ms(3_600_000), None, false)
        .unwrap();
    manager.shutdown().await;

    let saved = std::fs::read_to_string(loader.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&saved).unwrap();
    let ids: Vec<_> = value["schedule"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["adhoc", "nightly"]);
    assert_eq!(std::fs::read_to_string(loader.backup_path()).unwrap(), legacy);
}

#[tokio::test]
async fn missing_schedule_file_is_restored_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let loader = LocalFileScheduleLoader::in_dir(dir.path());

    let (manager, _) = start(&loader);
    manager
        .schedule("weekly", in_ms(3_600_000), Some(Period::Days(7)), false)
        .unwrap();
    manager.shutdown().await;
    std::fs::rename(loader.path(), loader.backup_path()).unwrap();

    let (manager, _) = start(&loader);

    let weekly = manager.scheduled_job("weekly").unwrap();
    assert_eq!(weekly.period(), Some(Period::Days(7)));
    assert!(loader.path().exists());
    assert_eq!(loader.load_schedule().unwrap().len(), 1);
    manager.shutdown().await;
}
