// src/engine/reconcile.rs

//! Post-run reconciliation: verify local outputs, publish them, derive the
//! next month's initial state and clean scratch space.
//!
//! Local files are only removed after every required artifact has been
//! published and its remote size re-read and matched. A failed step
//! returns early and leaves the scratch files in place, so re-running the
//! unit can pick up where it stopped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::{LocalArtifact, ZeroStateWriter};
use crate::store::ObjectStoreGate;
use crate::units::{ArtifactKind, ArtifactRef, SimulationUnit};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: Vec<ArtifactRef>,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct PostRunReconciler<'a, G: ?Sized, Z: ?Sized> {
    gate: &'a G,
    zero_state: &'a Z,
    scratch_dir: PathBuf,
}

/// Size of a local file that must exist and be non-empty.
async fn local_size(unit: &SimulationUnit, path: &Path) -> Result<u64> {
    let missing = || BatchError::MissingOutput {
        unit: unit.to_string(),
        path: path.display().to_string(),
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(missing()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(missing()),
        Err(err) => Err(err.into()),
    }
}

/// Upload `local` under `artifact`'s key and confirm the remote size
/// matches. Returns the verified size.
pub async fn publish_verified<G>(gate: &G, artifact: &ArtifactRef, local: &Path) -> Result<u64>
where
    G: ObjectStoreGate + ?Sized,
{
    let local_size = local_size(&artifact.unit, local).await?;
    let key = artifact.remote_key();

    gate.upload(local, &key).await?;

    let remote_size = match gate.size(&key).await {
        Ok(size) => Some(size),
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            warn!(unit = %artifact.unit, key = %key, error = %err, "could not read back remote size");
            None
        }
    };

    if remote_size != Some(local_size) {
        warn!(
            unit = %artifact.unit,
            key = %key,
            local_size,
            ?remote_size,
            "remote size does not match local file; keeping local copy"
        );
        return Err(BatchError::PublishVerification {
            key,
            local_size,
            remote_size,
        });
    }

    info!(unit = %artifact.unit, key = %key, bytes = local_size, "published artifact");
    Ok(local_size)
}

/// Delete scratch files. Failures are logged and otherwise ignored.
pub async fn cleanup_local<G>(gate: &G, paths: &[PathBuf]) -> usize
where
    G: ObjectStoreGate + ?Sized,
{
    let mut removed = 0;
    for path in paths {
        match gate.delete_local(path).await {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), error = %err, "failed to delete local file"),
        }
    }
    debug!(removed, total = paths.len(), "cleaned scratch files");
    removed
}

impl<'a, G, Z> PostRunReconciler<'a, G, Z>
where
    G: ObjectStoreGate + ?Sized,
    Z: ZeroStateWriter + ?Sized,
{
    pub fn new(gate: &'a G, zero_state: &'a Z, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            gate,
            zero_state,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Publish a unit's outputs and hand its final state to the next month.
    ///
    /// For the chain origin the handed-over state is a zero-valued copy of
    /// the final state.
    pub async fn publish(
        &self,
        unit: &SimulationUnit,
        local_outputs: &[LocalArtifact],
        chain_origin: bool,
    ) -> Result<PublishReport> {
        let find = |kind: ArtifactKind| {
            local_outputs
                .iter()
                .find(|o| o.artifact.kind == kind)
                .ok_or_else(|| BatchError::MissingOutput {
                    unit: unit.to_string(),
                    path: ArtifactRef::new(kind, unit.clone())
                        .local_path(&self.scratch_dir)
                        .display()
                        .to_string(),
                })
        };
        let output_series = find(ArtifactKind::OutputSeries)?;
        let final_state = find(ArtifactKind::FinalState)?;

        for output in local_outputs {
            let size = local_size(unit, &output.path).await?;
            debug!(unit = %unit, path = %output.path.display(), bytes = size, "verified local output");
        }

        let mut report = PublishReport::default();

        report.bytes +=
            publish_verified(self.gate, &output_series.artifact, &output_series.path).await?;
        report.published.push(output_series.artifact.clone());

        let carried = ArtifactRef::carried_state(unit);
        let carried_path = carried.local_path(&self.scratch_dir);
        if chain_origin {
            self.zero_state
                .write_zero_state(&final_state.path, &carried_path)
                .await?;
            info!(unit = %unit, next = %carried.unit, "derived zero-valued initial state for chain origin");
        } else {
            tokio::fs::copy(&final_state.path, &carried_path).await?;
        }

        report.bytes += publish_verified(self.gate, &carried, &carried_path).await?;
        report.published.push(carried);

        let mut transient: Vec<PathBuf> = local_outputs.iter().map(|o| o.path.clone()).collect();
        transient.push(carried_path);
        self.cleanup(&transient).await;

        Ok(report)
    }

    pub async fn cleanup(&self, paths: &[PathBuf]) -> usize {
        cleanup_local(self.gate, paths).await
    }
}
