// src/engine/chain.rs

//! Monthly state chain.
//!
//! Units sharing a basin/experiment/model/step key form a chain ordered by
//! month. Month `m + 1` needs the state published by month `m`, so a chain
//! stops at the first unit that cannot finish and never jumps ahead.
//!
//! The configured origin month has no predecessor: it is run from a cold
//! state and its final state is zeroed before being handed on. That is the
//! only place a synthetic state is produced; a missing state anywhere else
//! is waited for, never invented.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::engine::pipeline::{UnitPipeline, UnitRun};
use crate::engine::poller::{PollOutcome, ReadinessPoller};
use crate::errors::Result;
use crate::exec::{SimulationInvoker, ZeroStateWriter};
use crate::store::ObjectStoreGate;
use crate::units::{ArtifactRef, ChainKey, SimulationUnit, YearMonth};

/// What a unit needs before it may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInputs {
    pub required: Vec<ArtifactRef>,
    pub chain_origin: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChain {
    origin: Option<YearMonth>,
}

impl StateChain {
    pub fn new(origin: Option<YearMonth>) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> Option<YearMonth> {
        self.origin
    }

    pub fn is_origin(&self, unit: &SimulationUnit) -> bool {
        self.origin == Some(unit.year_month)
    }

    pub fn next_unit_inputs(&self, unit: &SimulationUnit) -> UnitInputs {
        let forcing = ArtifactRef::forcing_volume(unit);
        if self.is_origin(unit) {
            return UnitInputs {
                required: vec![forcing],
                chain_origin: true,
            };
        }
        // the predecessor's final state, stored under this unit's key
        let carried = ArtifactRef::carried_state(&unit.predecessor());
        UnitInputs {
            required: vec![forcing, carried],
            chain_origin: false,
        }
    }
}

/// Group units by chain, each chain sorted by month.
pub fn build_chains(units: &[SimulationUnit]) -> BTreeMap<ChainKey, Vec<SimulationUnit>> {
    let mut chains: BTreeMap<ChainKey, Vec<SimulationUnit>> = BTreeMap::new();
    for unit in units {
        chains.entry(unit.chain_key()).or_default().push(unit.clone());
    }
    for chain in chains.values_mut() {
        chain.sort_by_key(|u| u.year_month);
        chain.dedup();
    }
    chains
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAbort {
    pub unit: SimulationUnit,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    pub key: ChainKey,
    pub completed: Vec<(SimulationUnit, UnitRun)>,
    pub skipped: Vec<SimulationUnit>,
    pub aborted: Option<ChainAbort>,
}

impl ChainReport {
    fn new(key: ChainKey) -> Self {
        Self {
            key,
            completed: Vec::new(),
            skipped: Vec::new(),
            aborted: None,
        }
    }

    pub fn completed_units(&self) -> Vec<&SimulationUnit> {
        self.completed.iter().map(|(unit, _)| unit).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub chains: Vec<ChainReport>,
}

impl BatchReport {
    pub fn aborted(&self) -> Vec<&ChainAbort> {
        self.chains.iter().filter_map(|c| c.aborted.as_ref()).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.chains.iter().map(|c| c.completed.len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.chains.iter().map(|c| c.skipped.len()).sum()
    }
}

/// Drives chains unit by unit: skip if done, wait for inputs, run.
#[derive(Debug)]
pub struct ChainRunner<'a, G: ?Sized, I: ?Sized, Z: ?Sized> {
    chain: StateChain,
    poller: ReadinessPoller<'a, G>,
    pipeline: UnitPipeline<'a, G, I, Z>,
    unit_attempts: u32,
}

impl<'a, G, I, Z> ChainRunner<'a, G, I, Z>
where
    G: ObjectStoreGate + ?Sized,
    I: SimulationInvoker + ?Sized,
    Z: ZeroStateWriter + ?Sized,
{
    pub fn new(
        chain: StateChain,
        poller: ReadinessPoller<'a, G>,
        pipeline: UnitPipeline<'a, G, I, Z>,
        unit_attempts: u32,
    ) -> Self {
        Self {
            chain,
            poller,
            pipeline,
            unit_attempts: unit_attempts.max(1),
        }
    }

    /// Run every chain in turn. A fatal error stops the whole batch; any
    /// other failure only ends its own chain.
    pub async fn run_batch(&self, units: &[SimulationUnit]) -> Result<BatchReport> {
        let chains = build_chains(units);
        info!(chains = chains.len(), units = units.len(), "starting chained batch");

        let mut report = BatchReport::default();
        for (key, chain_units) in chains {
            match self.run_chain(key.clone(), &chain_units).await {
                Ok(chain_report) => report.chains.push(chain_report),
                Err(err) => {
                    error!(chain = %key, error = %err, "fatal error; aborting batch");
                    return Err(err);
                }
            }
        }

        info!(
            completed = report.completed_count(),
            skipped = report.skipped_count(),
            aborted_chains = report.aborted().len(),
            "chained batch finished"
        );
        Ok(report)
    }

    /// Run one chain in month order. Returns `Err` only for fatal errors.
    pub async fn run_chain(&self, key: ChainKey, units: &[SimulationUnit]) -> Result<ChainReport> {
        let mut report = ChainReport::new(key);

        for unit in units {
            if self.already_complete(unit).await? {
                info!(unit = %unit, "outputs already published; skipping");
                report.skipped.push(unit.clone());
                continue;
            }

            let inputs = self.chain.next_unit_inputs(unit);
            if let Some(reason) = self.wait_for_inputs(&inputs).await? {
                warn!(unit = %unit, reason = %reason, "aborting chain");
                report.aborted = Some(ChainAbort {
                    unit: unit.clone(),
                    reason,
                });
                break;
            }

            match self.run_unit(unit, &inputs).await? {
                Ok(run) => report.completed.push((unit.clone(), run)),
                Err(reason) => {
                    warn!(unit = %unit, reason = %reason, "aborting chain");
                    report.aborted = Some(ChainAbort {
                        unit: unit.clone(),
                        reason,
                    });
                    break;
                }
            }
        }

        Ok(report)
    }

    /// A failed completeness check that is not fatal means "run it again";
    /// re-publishing a unit's outputs is idempotent.
    async fn already_complete(&self, unit: &SimulationUnit) -> Result<bool> {
        match self.pipeline.is_complete(unit).await {
            Ok(complete) => Ok(complete),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(unit = %unit, error = %err, "completeness check failed; running unit");
                Ok(false)
            }
        }
    }

    /// `Some(reason)` if an input never appeared. Only fatal errors are
    /// returned; the poller absorbs the rest.
    async fn wait_for_inputs(&self, inputs: &UnitInputs) -> Result<Option<String>> {
        for artifact in &inputs.required {
            if let PollOutcome::Exhausted { attempts } = self.poller.wait_until_ready(artifact).await? {
                return Ok(Some(format!(
                    "{} not found after {attempts} checks",
                    artifact.remote_key()
                )));
            }
        }
        Ok(None)
    }

    /// Whole-unit attempts. The outer `Result` carries fatal errors, the
    /// inner one the reason the unit gave up.
    async fn run_unit(
        &self,
        unit: &SimulationUnit,
        inputs: &UnitInputs,
    ) -> Result<std::result::Result<UnitRun, String>> {
        let mut last_error = String::new();
        for attempt in 1..=self.unit_attempts {
            info!(unit = %unit, attempt, chain_origin = inputs.chain_origin, "running unit");
            match self.pipeline.execute(unit, inputs).await {
                Ok(run) => return Ok(Ok(run)),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(unit = %unit, attempt, max_attempts = self.unit_attempts, error = %err, "unit attempt failed");
                    last_error = err.to_string();
                }
            }
        }
        Ok(Err(format!(
            "failed after {} attempt(s): {last_error}",
            self.unit_attempts
        )))
    }
}
