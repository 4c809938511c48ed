// tests/dispatch_queue.rs

mod common;
use crate::common::builders::BatchConfigBuilder;
use crate::common::fakes::FakeTrigger;
use crate::common::{init_tracing, unit_in};

use std::time::Duration;

use rapid_batch::engine::DispatchQueue;
use rapid_batch::errors::BatchError;
use rapid_batch::plan::TaskEnumerator;
use rapid_batch::store::MemoryGate;
use rapid_batch::types::ReadinessTarget;
use rapid_batch::units::ArtifactRef;

#[tokio::test(start_paused = true)]
async fn test_queue_drains_as_outputs_appear() {
    init_tracing();
    let gate = MemoryGate::new();
    let units = vec![
        unit_in("1", "1980-01"),
        unit_in("2", "1980-01"),
        unit_in("3", "1980-01"),
    ];
    // unit 2 was finished by an earlier batch
    gate.put(ArtifactRef::output_series(&units[1]).remote_key(), "Qout");
    let trigger = FakeTrigger::completing(gate.clone(), ArtifactRef::output_series);

    let mut queue = DispatchQueue::new(
        &gate,
        &trigger,
        units.clone(),
        "currnt-data",
        ReadinessTarget::OutputSeries,
    )
    .with_rescan(Duration::from_secs(1200), None);

    let started = tokio::time::Instant::now();
    let summary = queue.run_until_empty().await.unwrap();

    assert_eq!(summary.passes, 2);
    assert_eq!(summary.completed, 3);
    assert!(queue.pending().is_empty());
    assert_eq!(trigger.triggered_units(), vec![units[0].clone(), units[2].clone()]);
    assert!(started.elapsed() >= Duration::from_secs(1200));
}

#[tokio::test(start_paused = true)]
async fn test_failed_trigger_is_retried_next_pass() {
    let gate = MemoryGate::new();
    let units = vec![unit_in("1", "1980-01"), unit_in("2", "1980-01")];
    let trigger = FakeTrigger::new().fail_for(&units[0]);

    let mut queue = DispatchQueue::new(
        &gate,
        &trigger,
        units.clone(),
        "currnt-data",
        ReadinessTarget::ForcingVolume,
    )
    .with_rescan(Duration::from_secs(60), Some(2));

    let first = queue.run_pass().await.unwrap();
    assert_eq!(first.trigger_failures, vec![units[0].clone()]);
    assert_eq!(first.triggered, vec![units[1].clone()]);
    assert_eq!(queue.pending().len(), 2);

    // unit 2's volume shows up; unit 1 is triggered again
    gate.put(ArtifactRef::forcing_volume(&units[1]).remote_key(), "m3");
    let second = queue.run_pass().await.unwrap();
    assert_eq!(second.completed, vec![units[1].clone()]);
    assert_eq!(second.trigger_failures, vec![units[0].clone()]);
    assert_eq!(queue.pending().snapshot(), vec![units[0].clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_expired_credentials_stop_dispatch() {
    let gate = MemoryGate::new();
    let units = vec![unit_in("1", "1980-01"), unit_in("2", "1980-01")];
    let trigger = FakeTrigger::new().with_expired_credentials();

    let mut queue = DispatchQueue::new(
        &gate,
        &trigger,
        units,
        "currnt-data",
        ReadinessTarget::ForcingVolume,
    );

    let err = queue.run_until_empty().await.unwrap_err();

    assert!(matches!(err, BatchError::Credential(_)));
    assert_eq!(queue.pending().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_requests_carry_unit_and_bucket() {
    let cfg = BatchConfigBuilder::new()
        .bucket("my-bucket")
        .basins(&["74"])
        .months(&["11", "12"])
        .max_passes(1)
        .build();
    let units = TaskEnumerator::from_config(&cfg).enumerate();
    let gate = MemoryGate::new();
    let trigger = FakeTrigger::new();

    let mut queue = DispatchQueue::new(
        &gate,
        &trigger,
        units.clone(),
        &cfg.batch.bucket,
        ReadinessTarget::ForcingVolume,
    )
    .with_rescan(cfg.rescan_interval(), cfg.retry.max_passes);

    let err = queue.run_until_empty().await.unwrap_err();
    assert!(matches!(err, BatchError::QueueExhausted { passes: 1, remaining: 2 }));

    let requests = trigger.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.bucket == "my-bucket"));
    assert_eq!(requests[1].unit(), units[1]);
    assert_ne!(requests[0].dedup_key(), requests[1].dedup_key());
}

#[tokio::test(start_paused = true)]
async fn test_throttled_check_keeps_unit_pending() {
    let gate = MemoryGate::new();
    let units = vec![unit_in("11", "1980-01"), unit_in("74", "1980-01")];
    for u in &units {
        gate.put(ArtifactRef::forcing_volume(u).remote_key(), "m3");
    }
    gate.fail_checks(ArtifactRef::forcing_volume(&units[0]).remote_key(), 1);
    let trigger = FakeTrigger::new();

    let mut queue = DispatchQueue::new(
        &gate,
        &trigger,
        units.clone(),
        "currnt-data",
        ReadinessTarget::ForcingVolume,
    )
    .with_rescan(Duration::from_secs(60), Some(5));

    let summary = queue.run_until_empty().await.unwrap();

    assert_eq!(summary.passes, 2);
    assert_eq!(summary.completed, 2);
    // the unit whose check failed was re-triggered rather than dropped
    assert_eq!(trigger.triggered_units(), vec![units[0].clone()]);
}
