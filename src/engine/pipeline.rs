// src/engine/pipeline.rs

//! One ready unit, end to end: stage inputs, invoke compute, reconcile.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::chain::UnitInputs;
use crate::engine::reconcile::{PostRunReconciler, PublishReport};
use crate::errors::Result;
use crate::exec::{SimulationInvoker, StagedInputs, ZeroStateWriter};
use crate::store::ObjectStoreGate;
use crate::units::{ArtifactKind, ArtifactRef, SimulationUnit};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitRun {
    pub published: Vec<ArtifactRef>,
    pub run_duration: Duration,
    pub peak_memory_mb: Option<f64>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct UnitPipeline<'a, G: ?Sized, I: ?Sized, Z: ?Sized> {
    gate: &'a G,
    invoker: &'a I,
    reconciler: PostRunReconciler<'a, G, Z>,
    scratch_dir: PathBuf,
}

impl<'a, G, I, Z> UnitPipeline<'a, G, I, Z>
where
    G: ObjectStoreGate + ?Sized,
    I: SimulationInvoker + ?Sized,
    Z: ZeroStateWriter + ?Sized,
{
    pub fn new(gate: &'a G, invoker: &'a I, zero_state: &'a Z, scratch_dir: impl Into<PathBuf>) -> Self {
        let scratch_dir = scratch_dir.into();
        Self {
            gate,
            invoker,
            reconciler: PostRunReconciler::new(gate, zero_state, scratch_dir.clone()),
            scratch_dir,
        }
    }

    /// A unit is complete once its output series and the state it hands to
    /// the next month are both published.
    pub async fn is_complete(&self, unit: &SimulationUnit) -> Result<bool> {
        let output = ArtifactRef::output_series(unit).remote_key();
        if !self.gate.exists(&output).await? {
            return Ok(false);
        }
        self.gate
            .exists(&ArtifactRef::carried_state(unit).remote_key())
            .await
    }

    /// Download required inputs into scratch space. Remote invokers fetch
    /// their own inputs.
    pub async fn stage(&self, unit: &SimulationUnit, inputs: &UnitInputs) -> Result<StagedInputs> {
        let mut staged = StagedInputs::remote(inputs.chain_origin);
        if !self.invoker.is_local() {
            return Ok(staged);
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        for artifact in &inputs.required {
            let path = artifact.local_path(&self.scratch_dir);
            self.gate.download(&artifact.remote_key(), &path).await?;
            debug!(unit = %unit, key = %artifact.remote_key(), path = %path.display(), "staged input");
            match artifact.kind {
                ArtifactKind::ForcingVolume => staged.forcing_volume = Some(path),
                ArtifactKind::InitialState => staged.initial_state = Some(path),
                ArtifactKind::FinalState | ArtifactKind::OutputSeries => {}
            }
        }
        Ok(staged)
    }

    /// Stage, invoke once, and reconcile. Staged inputs are removed only
    /// after the outputs are published.
    pub async fn execute(&self, unit: &SimulationUnit, inputs: &UnitInputs) -> Result<UnitRun> {
        let started = Instant::now();
        let staged = self.stage(unit, inputs).await?;

        let report = self.invoker.run(unit, &staged).await?;

        let publish = if self.invoker.is_local() {
            let publish = self
                .reconciler
                .publish(unit, &report.outputs, inputs.chain_origin)
                .await?;
            self.reconciler.cleanup(&staged.paths()).await;
            publish
        } else {
            PublishReport::default()
        };

        let elapsed = started.elapsed();
        info!(
            unit = %unit,
            published = publish.published.len(),
            bytes = publish.bytes,
            run_ms = report.duration.as_millis() as u64,
            elapsed_ms = elapsed.as_millis() as u64,
            "unit finished"
        );

        Ok(UnitRun {
            published: publish.published,
            run_duration: report.duration,
            peak_memory_mb: report.peak_memory_mb,
            elapsed,
        })
    }
}
