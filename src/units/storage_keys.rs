// src/units/storage_keys.rs

//! Remote key layout for simulation artifacts.
//!
//! ```text
//! pfaf_<basin>/<exp>/<model>/<step>/<YYYY-MM>/<kind>_pfaf_<basin>_<exp>_<model>_<step>_<YYYY-MM>[_utc].<ext>
//! ```
//!
//! The shape is shared with data already stored in the bucket and must not
//! change. Only the forcing volume carries `_utc` remotely; local scratch
//! copies always do.

use std::path::{Path, PathBuf};

use super::unit::SimulationUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Monthly runoff volume consumed by routing (`m3_riv`).
    ForcingVolume,
    /// Routing state at the start of the month (`Qinit`).
    InitialState,
    /// Routing state at the end of the month (`Qfinal`).
    FinalState,
    /// Discharge time series for the month (`Qout`).
    OutputSeries,
}

impl ArtifactKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::ForcingVolume => "m3_riv",
            Self::InitialState => "Qinit",
            Self::FinalState => "Qfinal",
            Self::OutputSeries => "Qout",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::ForcingVolume => "nc4",
            _ => "nc",
        }
    }

    fn remote_utc_suffix(self) -> bool {
        matches!(self, Self::ForcingVolume)
    }
}

/// Logical identity of one file produced or consumed by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub unit: SimulationUnit,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, unit: SimulationUnit) -> Self {
        Self { kind, unit }
    }

    pub fn forcing_volume(unit: &SimulationUnit) -> Self {
        Self::new(ArtifactKind::ForcingVolume, unit.clone())
    }

    pub fn initial_state(unit: &SimulationUnit) -> Self {
        Self::new(ArtifactKind::InitialState, unit.clone())
    }

    pub fn final_state(unit: &SimulationUnit) -> Self {
        Self::new(ArtifactKind::FinalState, unit.clone())
    }

    pub fn output_series(unit: &SimulationUnit) -> Self {
        Self::new(ArtifactKind::OutputSeries, unit.clone())
    }

    /// The state `unit` hands to the following month: its final state,
    /// stored under the successor's initial-state key.
    pub fn carried_state(unit: &SimulationUnit) -> Self {
        Self::initial_state(&unit.successor())
    }

    pub fn remote_file_name(&self) -> String {
        let utc = if self.kind.remote_utc_suffix() { "_utc" } else { "" };
        format!(
            "{}_{}{}.{}",
            self.kind.prefix(),
            self.unit.file_stem(),
            utc,
            self.kind.extension()
        )
    }

    pub fn local_file_name(&self) -> String {
        format!(
            "{}_{}_utc.{}",
            self.kind.prefix(),
            self.unit.file_stem(),
            self.kind.extension()
        )
    }

    pub fn remote_key(&self) -> String {
        format!("{}/{}", self.unit.remote_prefix(), self.remote_file_name())
    }

    pub fn local_path(&self, scratch_dir: &Path) -> PathBuf {
        scratch_dir.join(self.local_file_name())
    }
}
