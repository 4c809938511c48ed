// src/engine/queue.rs

//! Dispatch queue for independent units.
//!
//! Each pass walks a snapshot of the pending set. Units whose readiness
//! artifact is published are removed; every other unit gets a compute
//! trigger (re-sent on later passes, duplicates are collapsed on the
//! compute side). A readiness check that fails without a fatal error
//! leaves the unit pending. Between passes the whole queue sleeps for the
//! long rescan interval.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::ComputeTrigger;
use crate::store::ObjectStoreGate;
use crate::types::ReadinessTarget;
use crate::units::{ArtifactRef, ComputeRequest, SimulationUnit};

/// Units not yet confirmed complete, in enumeration order. Only ever
/// shrinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTaskSet {
    units: Vec<SimulationUnit>,
}

impl PendingTaskSet {
    pub fn new(units: impl IntoIterator<Item = SimulationUnit>) -> Self {
        let mut set = Self::default();
        for unit in units {
            if !set.units.contains(&unit) {
                set.units.push(unit);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, unit: &SimulationUnit) -> bool {
        self.units.contains(unit)
    }

    pub fn snapshot(&self) -> Vec<SimulationUnit> {
        self.units.clone()
    }

    pub fn remove(&mut self, unit: &SimulationUnit) -> bool {
        let before = self.units.len();
        self.units.retain(|u| u != unit);
        self.units.len() != before
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub completed: Vec<SimulationUnit>,
    pub triggered: Vec<SimulationUnit>,
    /// Units whose trigger failed with a non-fatal error; still pending.
    pub trigger_failures: Vec<SimulationUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub passes: u32,
    pub completed: usize,
}

#[derive(Debug)]
pub struct DispatchQueue<'a, G: ?Sized, T: ?Sized> {
    gate: &'a G,
    trigger: &'a T,
    pending: PendingTaskSet,
    target: ReadinessTarget,
    bucket: String,
    rescan_interval: Duration,
    max_passes: Option<u32>,
}

impl<'a, G, T> DispatchQueue<'a, G, T>
where
    G: ObjectStoreGate + ?Sized,
    T: ComputeTrigger + ?Sized,
{
    pub fn new(
        gate: &'a G,
        trigger: &'a T,
        units: impl IntoIterator<Item = SimulationUnit>,
        bucket: impl Into<String>,
        target: ReadinessTarget,
    ) -> Self {
        Self {
            gate,
            trigger,
            pending: PendingTaskSet::new(units),
            target,
            bucket: bucket.into(),
            rescan_interval: Duration::from_secs(20 * 60),
            max_passes: None,
        }
    }

    pub fn with_rescan(mut self, interval: Duration, max_passes: Option<u32>) -> Self {
        self.rescan_interval = interval;
        self.max_passes = max_passes;
        self
    }

    pub fn pending(&self) -> &PendingTaskSet {
        &self.pending
    }

    fn readiness_artifact(&self, unit: &SimulationUnit) -> ArtifactRef {
        match self.target {
            ReadinessTarget::ForcingVolume => ArtifactRef::forcing_volume(unit),
            ReadinessTarget::OutputSeries => ArtifactRef::output_series(unit),
        }
    }

    /// One scan over the pending set.
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        let mut report = PassReport::default();

        for unit in self.pending.snapshot() {
            let artifact = self.readiness_artifact(&unit);
            let ready = match self.gate.exists(&artifact.remote_key()).await {
                Ok(ready) => ready,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(unit = %unit, key = %artifact.remote_key(), error = %err, "existence check failed; treating unit as pending");
                    false
                }
            };
            if ready {
                info!(unit = %unit, key = %artifact.remote_key(), "unit complete; removing from queue");
                self.pending.remove(&unit);
                report.completed.push(unit);
                continue;
            }

            let request = ComputeRequest::for_unit(&unit, &self.bucket);
            match self.trigger.trigger(&request).await {
                Ok(()) => report.triggered.push(unit),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(unit = %unit, error = %err, "compute trigger failed; will retry next pass");
                    report.trigger_failures.push(unit);
                }
            }
        }

        Ok(report)
    }

    /// Re-scan until the pending set is empty or `max_passes` is reached.
    pub async fn run_until_empty(&mut self) -> Result<DispatchSummary> {
        let started = Instant::now();
        let mut summary = DispatchSummary {
            passes: 0,
            completed: 0,
        };

        while !self.pending.is_empty() {
            summary.passes += 1;
            let pass = self.run_pass().await?;
            summary.completed += pass.completed.len();

            info!(
                pass = summary.passes,
                completed = pass.completed.len(),
                triggered = pass.triggered.len(),
                failed_triggers = pass.trigger_failures.len(),
                pending = self.pending.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dispatch pass finished"
            );

            if self.pending.is_empty() {
                break;
            }
            if self.max_passes.is_some_and(|max| summary.passes >= max) {
                return Err(BatchError::QueueExhausted {
                    passes: summary.passes,
                    remaining: self.pending.len(),
                });
            }

            info!(
                sleep_secs = self.rescan_interval.as_secs(),
                pending = self.pending.len(),
                "waiting before next dispatch pass"
            );
            tokio::time::sleep(self.rescan_interval).await;
        }

        info!(passes = summary.passes, completed = summary.completed, "dispatch queue empty");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::store::MemoryGate;
    use crate::types::BoxFuture;

    #[derive(Default)]
    struct RecordingTrigger {
        sent: Mutex<Vec<ComputeRequest>>,
    }

    impl ComputeTrigger for RecordingTrigger {
        fn trigger<'a>(&'a self, request: &'a ComputeRequest) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(request.clone());
                Ok(())
            })
        }
    }

    fn unit(basin: &str) -> SimulationUnit {
        SimulationUnit::new(basin, "GLDAS", "VIC", "3H", "1980-01".parse().unwrap())
    }

    #[test]
    fn pending_set_dedups_and_only_shrinks() {
        let mut set = PendingTaskSet::new([unit("1"), unit("2"), unit("1")]);
        assert_eq!(set.len(), 2);
        assert!(set.remove(&unit("1")));
        assert!(!set.remove(&unit("1")));
        assert_eq!(set.snapshot(), vec![unit("2")]);
    }

    #[tokio::test]
    async fn pass_removes_ready_units_and_triggers_the_rest() {
        let gate = MemoryGate::new();
        gate.put(ArtifactRef::forcing_volume(&unit("2")).remote_key(), b"m3".to_vec());
        let trigger = RecordingTrigger::default();
        let mut queue = DispatchQueue::new(
            &gate,
            &trigger,
            [unit("1"), unit("2"), unit("3")],
            "currnt-data",
            ReadinessTarget::ForcingVolume,
        );

        let report = queue.run_pass().await.unwrap();

        assert_eq!(report.completed, vec![unit("2")]);
        assert_eq!(queue.pending().snapshot(), vec![unit("1"), unit("3")]);
        let sent = trigger.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].unit(), unit("1"));
        assert_eq!(sent[1].bucket, "currnt-data");
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_passes_report_remaining_units() {
        let gate = MemoryGate::new();
        let trigger = RecordingTrigger::default();
        let mut queue = DispatchQueue::new(&gate, &trigger, [unit("1")], "b", ReadinessTarget::OutputSeries)
            .with_rescan(Duration::from_secs(60), Some(3));

        let err = queue.run_until_empty().await.unwrap_err();

        assert!(matches!(err, BatchError::QueueExhausted { passes: 3, remaining: 1 }));
        assert_eq!(trigger.sent.lock().unwrap().len(), 3);
    }
}
