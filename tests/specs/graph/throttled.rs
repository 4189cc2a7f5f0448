//! Graph nodes throttled on shared permit pools.

use crate::prelude::*;

use std::sync::Arc;
use std::time::Duration;

use tw_core::test_support::{ConcurrencyGauge, FakeJob};
use tw_core::{Job, NodeStatus};
use tw_engine::{GraphConfig, GraphState, JobGraph, ResourceThrottledJob};
use tw_locks::NamedPermitManager;

fn config() -> GraphConfig {
    GraphConfig {
        poll_interval: Duration::from_millis(20),
        max_parallel: None,
    }
}

fn throttled(permits: &NamedPermitManager, pool: &str, inner: &FakeJob) -> Arc<dyn Job> {
    let lock = permits.named_permit(pool, 1).unwrap();
    Arc::new(ResourceThrottledJob::new(
        Arc::new(inner.clone()),
        Arc::new(lock),
    ))
}

#[yare::parameterized(
    serial   = { 1 },
    pairwise = { 2 },
)]
#[test_macro(tokio::test)]
async fn independent_nodes_respect_the_pool(total: u32) {
    let permits = NamedPermitManager::new();
    permits.create_named_permit("cluster", total);
    let gauge = ConcurrencyGauge::new();
    let jobs: Vec<_> = (0..5)
        .map(|i| {
            FakeJob::builder(&format!("step-{i}"))
                .delay(Duration::from_millis(40))
                .gauge(&gauge)
                .build()
        })
        .collect();

    let graph = JobGraph::new("nightly", config());
    for job in &jobs {
        graph.add_job(throttled(&permits, "cluster", job), vec![]);
    }
    tokio::time::timeout(Duration::from_secs(5), graph.run())
        .await
        .unwrap()
        .unwrap();

    assert!(gauge.peak() <= total as usize, "peak {}", gauge.peak());
    assert_eq!(graph.successful_jobs().len(), 5);
    assert_eq!(permits.available_permits("cluster"), Some(total as usize));
}

#[tokio::test]
async fn cancelling_the_graph_stops_lock_waits() {
    let permits = NamedPermitManager::new();
    permits.create_named_permit("cluster", 1);
    let holder = FakeJob::builder("holder")
        .delay(Duration::from_secs(30))
        .cancellable()
        .build();
    let waiter = FakeJob::ok("waiter");

    let graph = Arc::new(JobGraph::new("nightly", config()));
    graph.add_job(throttled(&permits, "cluster", &holder), vec![]);
    graph.add_job(throttled(&permits, "cluster", &waiter), vec![]);

    let runner = {
        let graph = Arc::clone(&graph);
        tokio::spawn(async move { graph.run().await })
    };
    assert!(wait_for(|| graph.running_jobs().len() == 2 && holder.runs() == 1).await);

    graph.cancel().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(graph.state(), GraphState::Stopped);
    assert_eq!(holder.cancels(), 1);
    assert_eq!(waiter.runs(), 0);
    assert_eq!(graph.status_of("holder"), Some(NodeStatus::Failed));
    assert_eq!(graph.status_of("waiter"), Some(NodeStatus::Failed));
    assert_eq!(permits.available_permits("cluster"), Some(1));
}
