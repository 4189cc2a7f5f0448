//! Scheduler fires into graph runs of throttled, retrying jobs.

use crate::prelude::*;

use std::sync::Arc;
use std::time::Duration;

use tw_core::test_support::{EventLog, FakeJob};
use tw_core::{Job, JobError, Period, ScheduleLoader};
use tw_engine::{
    GraphConfig, JobGraph, ResourceThrottledJob, RetryingJob, ScheduleManager, SchedulerConfig,
};
use tw_locks::NamedPermitManager;
use tw_storage::LocalFileScheduleLoader;

fn config() -> GraphConfig {
    GraphConfig {
        poll_interval: Duration::from_millis(20),
        max_parallel: Some(4),
    }
}

/// extract -> transform -> load, every step throttled on the warehouse pool.
fn etl_graph(
    permits: &Arc<NamedPermitManager>,
    extract: &FakeJob,
    transform: &FakeJob,
    load: &FakeJob,
) -> JobGraph {
    let throttle = |inner: Arc<dyn Job>| -> Arc<dyn Job> {
        let lock = permits.named_permit("warehouse", 1).unwrap();
        Arc::new(ResourceThrottledJob::new(inner, Arc::new(lock)))
    };
    let extract = throttle(Arc::new(extract.clone()));
    let transform = throttle(Arc::new(RetryingJob::new(
        Arc::new(transform.clone()),
        2,
        Duration::from_millis(10),
    )));
    let load = throttle(Arc::new(load.clone()));

    let graph = JobGraph::new("load", config());
    graph.add_job(Arc::clone(&transform), vec![extract]);
    graph.add_job(load, vec![transform]);
    graph
}

fn position(log: &EventLog, event: &str) -> usize {
    log.lock()
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("missing event {event}"))
}

#[tokio::test]
async fn fired_entry_runs_its_graph_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::default();
    let permits = Arc::new(NamedPermitManager::new());
    permits.create_named_permit("warehouse", 1);

    let extract = FakeJob::builder("extract").log(&log).build();
    let transform = FakeJob::builder("transform").fail_times(1).log(&log).build();
    let load = FakeJob::builder("load").log(&log).build();

    let executor = GraphExecutor::new();
    {
        let (permits, extract, transform, load) =
            (Arc::clone(&permits), extract.clone(), transform.clone(), load.clone());
        executor.register("load", move |_| etl_graph(&permits, &extract, &transform, &load));
    }
    let loader = LocalFileScheduleLoader::in_dir(dir.path());
    let manager = ScheduleManager::start(
        Arc::new(executor.clone()),
        Arc::new(loader.clone()),
        SchedulerConfig::default(),
    )
    .unwrap();

    manager.schedule("load", in_ms(100), None, false).unwrap();

    assert!(wait_for(|| executor.outcomes_for("load").len() == 1).await);
    assert_eq!(executor.outcomes_for("load"), vec![Ok(())]);
    assert!(position(&log, "end:extract") < position(&log, "start:transform"));
    assert!(position(&log, "end:transform") < position(&log, "start:load"));
    assert_eq!(transform.runs(), 2);
    assert_eq!(permits.available_permits("warehouse"), Some(1));

    // The one-shot entry is gone from the saved schedule
    assert!(loader.load_schedule().unwrap().is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn failed_upstream_step_fails_the_run() {
    let permits = Arc::new(NamedPermitManager::new());
    permits.create_named_permit("warehouse", 1);
    let extract = FakeJob::failing("extract");
    let transform = FakeJob::ok("transform");
    let load = FakeJob::ok("load");

    let executor = GraphExecutor::new();
    {
        let (permits, extract, transform, load) =
            (Arc::clone(&permits), extract.clone(), transform.clone(), load.clone());
        executor.register("load", move |_| etl_graph(&permits, &extract, &transform, &load));
    }
    let manager = ScheduleManager::start(
        Arc::new(executor.clone()),
        Arc::new(tw_core::test_support::MemoryLoader::new()),
        SchedulerConfig::default(),
    )
    .unwrap();

    manager.schedule("load", in_ms(50), None, false).unwrap();

    assert!(wait_for(|| executor.outcomes_for("load").len() == 1).await);
    let Err(JobError::Failed(message)) = executor.outcomes_for("load").remove(0) else {
        panic!("expected the run to fail");
    };
    assert!(message.starts_with("GraphJob(load) Failed with Exception message:\n"));
    assert!(message.contains("Job:transform Failing as Dependent Job extract failed"));
    assert!(message.contains("Job:load Failing as Dependent Job transform failed"));
    assert_eq!(transform.runs(), 0);
    assert_eq!(load.runs(), 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn recurring_entry_builds_a_fresh_graph_each_period() {
    let permits = Arc::new(NamedPermitManager::new());
    permits.create_named_permit("warehouse", 1);
    let extract = FakeJob::ok("extract");
    let transform = FakeJob::ok("transform");
    let load = FakeJob::ok("load");

    let executor = GraphExecutor::new();
    {
        let (permits, extract, transform, load) =
            (Arc::clone(&permits), extract.clone(), transform.clone(), load.clone());
        executor.register("load", move |_| etl_graph(&permits, &extract, &transform, &load));
    }
    let manager = ScheduleManager::start(
        Arc::new(executor.clone()),
        Arc::new(tw_core::test_support::MemoryLoader::new()),
        SchedulerConfig::default(),
    )
    .unwrap();

    manager
        .schedule("load", in_ms(50), Some(Period::Seconds(1)), false)
        .unwrap();

    assert!(wait_for(|| executor.outcomes_for("load").len() >= 2).await);
    assert!(executor.outcomes_for("load").iter().all(|o| o.is_ok()));
    assert!(load.runs() >= 2);
    assert!(manager.scheduled_job("load").is_some());

    manager.remove_scheduled_job("load").unwrap();
    manager.shutdown().await;
}

#[tokio::test]
async fn unknown_ids_do_not_stop_later_fires() {
    let executor = GraphExecutor::new();
    executor.register("known", |_| {
        let graph = JobGraph::new("known", GraphConfig::default());
        graph.add_job(Arc::new(FakeJob::ok("known")), vec![]);
        graph
    });
    let manager = ScheduleManager::start(
        Arc::new(executor.clone()),
        Arc::new(tw_core::test_support::MemoryLoader::new()),
        SchedulerConfig::default(),
    )
    .unwrap();

    manager.schedule("ghost", in_ms(30), None, false).unwrap();
    manager.schedule("known", in_ms(120), None, false).unwrap();

    assert!(wait_for(|| executor.outcomes_for("known").len() == 1).await);
    assert!(executor.outcomes_for("ghost").is_empty());
    manager.shutdown().await;
}
