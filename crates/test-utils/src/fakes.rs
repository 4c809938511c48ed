#![allow(dead_code)]

//! In-process stand-ins for the compute collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rapid_batch::errors::{BatchError, Result};
use rapid_batch::exec::{
    ComputeTrigger, LocalArtifact, RunReport, SimulationInvoker, StagedInputs, ZeroStateWriter,
};
use rapid_batch::store::MemoryGate;
use rapid_batch::types::BoxFuture;
use rapid_batch::units::{ArtifactRef, ComputeRequest, SimulationUnit};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct FakeRun {
    pub unit: SimulationUnit,
    pub inputs: StagedInputs,
    /// Contents of the staged initial state, if one was staged.
    pub initial_state: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct InvokerState {
    runs: Vec<FakeRun>,
    /// Remaining failures per unit.
    failures: HashMap<SimulationUnit, u32>,
    /// Units whose run forgets to write the final state.
    drop_final_state: Vec<SimulationUnit>,
}

/// Simulation invoker that writes small, deterministic output files into
/// scratch space instead of running a routing model.
///
/// - `Qout` contains `"Qout <unit>"`.
/// - `Qfinal` contains `"Qfinal <unit>"`.
#[derive(Debug)]
pub struct FakeInvoker {
    scratch_dir: PathBuf,
    local: bool,
    state: Mutex<InvokerState>,
}

impl FakeInvoker {
    pub fn new(scratch_dir: &Path) -> Self {
        Self {
            scratch_dir: scratch_dir.to_path_buf(),
            local: true,
            state: Mutex::new(InvokerState::default()),
        }
    }

    /// Behaves like a remote function: no local outputs, nothing staged.
    pub fn remote() -> Self {
        Self {
            scratch_dir: PathBuf::new(),
            local: false,
            state: Mutex::new(InvokerState::default()),
        }
    }

    /// Fail the next `times` runs of `unit` with a compute error.
    pub fn fail_times(self, unit: &SimulationUnit, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(unit.clone(), times);
        self
    }

    pub fn fail_always(self, unit: &SimulationUnit) -> Self {
        self.fail_times(unit, u32::MAX)
    }

    pub fn without_final_state(self, unit: &SimulationUnit) -> Self {
        self.state
            .lock()
            .unwrap()
            .drop_final_state
            .push(unit.clone());
        self
    }

    pub fn runs(&self) -> Vec<FakeRun> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn run_units(&self) -> Vec<SimulationUnit> {
        self.runs().into_iter().map(|r| r.unit).collect()
    }

    fn should_fail(&self, unit: &SimulationUnit) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.failures.get_mut(unit) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl SimulationInvoker for FakeInvoker {
    fn run<'a>(
        &'a self,
        unit: &'a SimulationUnit,
        inputs: &'a StagedInputs,
    ) -> BoxFuture<'a, Result<RunReport>> {
        Box::pin(async move {
            let initial_state = match &inputs.initial_state {
                Some(path) => Some(tokio::fs::read(path).await?),
                None => None,
            };
            self.state.lock().unwrap().runs.push(FakeRun {
                unit: unit.clone(),
                inputs: inputs.clone(),
                initial_state,
            });

            if self.should_fail(unit) {
                return Err(BatchError::Compute {
                    unit: unit.to_string(),
                    diagnostic: "exit status 1: fake routing failure".to_string(),
                });
            }

            if !self.local {
                return Ok(RunReport {
                    outputs: Vec::new(),
                    duration: Duration::from_millis(10),
                    peak_memory_mb: Some(128.0),
                });
            }

            tokio::fs::create_dir_all(&self.scratch_dir).await?;

            let qout = ArtifactRef::output_series(unit);
            let qout_path = qout.local_path(&self.scratch_dir);
            tokio::fs::write(&qout_path, format!("Qout {unit}")).await?;
            let mut outputs = vec![LocalArtifact::new(qout, qout_path)];

            let qfinal = ArtifactRef::final_state(unit);
            let qfinal_path = qfinal.local_path(&self.scratch_dir);
            let drop_final = self.state.lock().unwrap().drop_final_state.contains(unit);
            if !drop_final {
                tokio::fs::write(&qfinal_path, format!("Qfinal {unit}")).await?;
            }
            // the path is still reported, as a crashed model would leave it
            outputs.push(LocalArtifact::new(qfinal, qfinal_path));

            Ok(RunReport {
                outputs,
                duration: Duration::from_millis(10),
                peak_memory_mb: None,
            })
        })
    }

    fn is_local(&self) -> bool {
        self.local
    }
}

/// Zero-state writer that replaces every byte with `0`.
#[derive(Debug, Default)]
pub struct FakeZeroState {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeZeroState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ZeroStateWriter for FakeZeroState {
    fn write_zero_state<'a>(
        &'a self,
        template: &'a Path,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(template).await?;
            tokio::fs::write(dest, vec![0u8; bytes.len()]).await?;
            self.calls
                .lock()
                .unwrap()
                .push((template.to_path_buf(), dest.to_path_buf()));
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct TriggerState {
    requests: Vec<ComputeRequest>,
    failing: Vec<SimulationUnit>,
    expired: bool,
}

type Completion = Box<dyn Fn(&SimulationUnit) -> ArtifactRef + Send + Sync>;

/// Records compute requests. Optionally "runs" them by publishing the
/// readiness artifact into a [`MemoryGate`].
pub struct FakeTrigger {
    state: Arc<Mutex<TriggerState>>,
    completes_into: Option<(MemoryGate, Completion)>,
}

impl FakeTrigger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TriggerState::default())),
            completes_into: None,
        }
    }

    /// Each accepted request publishes `artifact(unit)` into `gate`.
    pub fn completing(
        gate: MemoryGate,
        artifact: impl Fn(&SimulationUnit) -> ArtifactRef + Send + Sync + 'static,
    ) -> Self {
        Self {
            completes_into: Some((gate, Box::new(artifact))),
            ..Self::new()
        }
    }

    /// Triggers for `unit` fail with a non-fatal compute error.
    pub fn fail_for(self, unit: &SimulationUnit) -> Self {
        self.state.lock().unwrap().failing.push(unit.clone());
        self
    }

    /// Every trigger fails with a credential error.
    pub fn with_expired_credentials(self) -> Self {
        self.state.lock().unwrap().expired = true;
        self
    }

    pub fn requests(&self) -> Vec<ComputeRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn triggered_units(&self) -> Vec<SimulationUnit> {
        self.requests().iter().map(ComputeRequest::unit).collect()
    }
}

impl Default for FakeTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeTrigger for FakeTrigger {
    fn trigger<'a>(&'a self, request: &'a ComputeRequest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let unit = request.unit();
            {
                let mut state = self.state.lock().unwrap();
                if state.expired {
                    return Err(BatchError::Credential("ExpiredToken".to_string()));
                }
                state.requests.push(request.clone());
                if state.failing.contains(&unit) {
                    return Err(BatchError::Compute {
                        unit: unit.to_string(),
                        diagnostic: "queue rejected message".to_string(),
                    });
                }
            }

            if let Some((gate, artifact)) = &self.completes_into {
                let key = artifact(&unit).remote_key();
                gate.put(key, format!("output for {unit}"));
            }
            Ok(())
        })
    }
}
