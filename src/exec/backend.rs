// src/exec/backend.rs

//! Pluggable simulation invoker abstraction.
//!
//! The engine talks to a `SimulationInvoker` instead of spawning processes
//! itself. Production code uses [`super::process::ProcessInvoker`] (local
//! routing executable) or [`super::lambda::LambdaInvoker`] (remote
//! function); tests swap in a fake that writes output files directly.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::Result;
use crate::types::BoxFuture;
use crate::units::{ArtifactRef, SimulationUnit};

/// An artifact materialized in local scratch space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub artifact: ArtifactRef,
    pub path: PathBuf,
}

impl LocalArtifact {
    pub fn new(artifact: ArtifactRef, path: impl Into<PathBuf>) -> Self {
        Self {
            artifact,
            path: path.into(),
        }
    }
}

/// Inputs made available to one run.
///
/// Remote invokers fetch their own inputs, so the paths stay empty for
/// them. The chain origin has no initial state to stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedInputs {
    pub chain_origin: bool,
    pub forcing_volume: Option<PathBuf>,
    pub initial_state: Option<PathBuf>,
}

impl StagedInputs {
    pub fn remote(chain_origin: bool) -> Self {
        Self {
            chain_origin,
            ..Self::default()
        }
    }

    /// Local files created by staging.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.forcing_volume
            .iter()
            .chain(self.initial_state.iter())
            .cloned()
            .collect()
    }
}

/// Result of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Local outputs left for the reconciler; empty for remote invokers.
    pub outputs: Vec<LocalArtifact>,
    pub duration: Duration,
    pub peak_memory_mb: Option<f64>,
}

pub trait SimulationInvoker: Send + Sync {
    /// Invoke the compute collaborator exactly once for `unit`.
    ///
    /// Fails with `BatchError::Compute` on a non-zero exit or invocation
    /// error. No internal retry.
    fn run<'a>(
        &'a self,
        unit: &'a SimulationUnit,
        inputs: &'a StagedInputs,
    ) -> BoxFuture<'a, Result<RunReport>>;

    /// `false` when the collaborator stages, runs and publishes on its own
    /// side; the engine then skips staging and reconciliation.
    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_paths_skip_missing_initial_state() {
        let staged = StagedInputs {
            chain_origin: true,
            forcing_volume: Some(PathBuf::from("/tmp/m3.nc4")),
            initial_state: None,
        };
        assert_eq!(staged.paths(), vec![PathBuf::from("/tmp/m3.nc4")]);
        assert!(StagedInputs::remote(false).paths().is_empty());
    }
}
