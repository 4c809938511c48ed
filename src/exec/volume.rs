// src/exec/volume.rs

//! Volume stage of the worker: download forcing granules for one month,
//! derive the runoff volume and publish it as the unit's forcing-volume
//! artifact.

use std::path::PathBuf;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::DatasetSection;
use crate::engine::reconcile::{cleanup_local, publish_verified};
use crate::errors::{BatchError, Result};
use crate::exec::forcing::{ForcingQuery, ForcingSource};
use crate::exec::process::{diagnostic, render_command_with_lists, run_shell, unit_vars};
use crate::store::ObjectStoreGate;
use crate::units::{ArtifactRef, SimulationUnit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeOutcome {
    /// The forcing volume was already published; nothing was downloaded.
    AlreadyPresent,
    Published { granules: usize, bytes: u64 },
}

#[derive(Debug)]
pub struct VolumeWorker<'a, G: ?Sized, F: ?Sized> {
    gate: &'a G,
    source: &'a F,
    volume_cmd: String,
    dataset: DatasetSection,
    scratch_dir: PathBuf,
}

impl<'a, G, F> VolumeWorker<'a, G, F>
where
    G: ObjectStoreGate + ?Sized,
    F: ForcingSource + ?Sized,
{
    pub fn new(
        gate: &'a G,
        source: &'a F,
        volume_cmd: impl Into<String>,
        dataset: DatasetSection,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gate,
            source,
            volume_cmd: volume_cmd.into(),
            dataset,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub async fn run(&self, unit: &SimulationUnit) -> Result<VolumeOutcome> {
        let artifact = ArtifactRef::forcing_volume(unit);
        if self.gate.exists(&artifact.remote_key()).await? {
            info!(unit = %unit, key = %artifact.remote_key(), "forcing volume already published; skipping");
            return Ok(VolumeOutcome::AlreadyPresent);
        }

        let started = Instant::now();
        let query = ForcingQuery::for_unit(unit, &self.dataset, &self.scratch_dir);
        let granules = self.source.fetch(&query).await?;
        if granules.is_empty() {
            return Err(BatchError::Compute {
                unit: unit.to_string(),
                diagnostic: format!(
                    "no forcing granules found for {} between {} and {}",
                    query.short_name, query.temporal.0, query.temporal.1
                ),
            });
        }
        if granules.len() as u64 > u64::from(query.count) {
            warn!(unit = %unit, granules = granules.len(), requested = query.count, "more granules than requested");
        }

        let vars = unit_vars(unit, &self.scratch_dir);
        let paths: Vec<String> = granules.iter().map(|p| p.display().to_string()).collect();
        let cmd = render_command_with_lists(&self.volume_cmd, &vars, &[("granules", paths)]);

        info!(unit = %unit, granules = granules.len(), cmd = %cmd, "running volume command");
        let output = run_shell(&cmd).await?;
        if !output.status.success() {
            return Err(BatchError::Compute {
                unit: unit.to_string(),
                diagnostic: diagnostic(&output),
            });
        }

        let local = artifact.local_path(&self.scratch_dir);
        let bytes = publish_verified(self.gate, &artifact, &local).await?;

        let mut transient = granules.clone();
        transient.push(local);
        cleanup_local(self.gate, &transient).await;

        info!(
            unit = %unit,
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "forcing volume published"
        );
        Ok(VolumeOutcome::Published {
            granules: granules.len(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGate;
    use crate::types::BoxFuture;

    struct StaticSource(Vec<PathBuf>);

    impl ForcingSource for StaticSource {
        fn fetch<'a>(&'a self, _query: &'a ForcingQuery) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    fn unit() -> SimulationUnit {
        SimulationUnit::new("74", "GLDAS", "VIC", "3H", "1980-01".parse().unwrap())
    }

    #[tokio::test]
    async fn skips_when_volume_exists() {
        let gate = MemoryGate::new();
        gate.put(ArtifactRef::forcing_volume(&unit()).remote_key(), b"m3".to_vec());
        let source = StaticSource(Vec::new());
        let worker = VolumeWorker::new(&gate, &source, "false", DatasetSection::default(), "/tmp");

        assert_eq!(worker.run(&unit()).await.unwrap(), VolumeOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn zero_granules_is_an_error() {
        let gate = MemoryGate::new();
        let source = StaticSource(Vec::new());
        let worker = VolumeWorker::new(&gate, &source, "true", DatasetSection::default(), "/tmp");

        let err = worker.run(&unit()).await.unwrap_err();
        assert!(err.to_string().contains("no forcing granules"));
        assert!(gate.uploads().is_empty());
    }

    #[tokio::test]
    async fn publishes_volume_and_removes_granules() {
        let dir = tempfile::tempdir().unwrap();
        let granule = dir.path().join("GLDAS_VIC10_3H.A19800101.nc4");
        tokio::fs::write(&granule, b"granule").await.unwrap();

        let gate = MemoryGate::new();
        let source = StaticSource(vec![granule.clone()]);
        let worker = VolumeWorker::new(
            &gate,
            &source,
            "cat {granules} > {forcing_volume}",
            DatasetSection::default(),
            dir.path(),
        );

        let outcome = worker.run(&unit()).await.unwrap();

        assert_eq!(outcome, VolumeOutcome::Published { granules: 1, bytes: 7 });
        assert_eq!(
            gate.object("pfaf_74/GLDAS/VIC/3H/1980-01/m3_riv_pfaf_74_GLDAS_VIC_3H_1980-01_utc.nc4"),
            Some(b"granule".to_vec())
        );
        assert!(!granule.exists());
    }
}
