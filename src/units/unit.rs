// src/units/unit.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use super::year_month::YearMonth;

/// Identity of one monthly simulation: basin x experiment x model x step x month.
///
/// Immutable once enumerated; equality is by the five-tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimulationUnit {
    pub basin_id: String,
    pub experiment: String,
    pub model: String,
    pub step: String,
    pub year_month: YearMonth,
}

/// The month-independent part of a unit; all units sharing a key form one
/// state chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainKey {
    pub basin_id: String,
    pub experiment: String,
    pub model: String,
    pub step: String,
}

impl SimulationUnit {
    pub fn new(
        basin_id: impl Into<String>,
        experiment: impl Into<String>,
        model: impl Into<String>,
        step: impl Into<String>,
        year_month: YearMonth,
    ) -> Self {
        Self {
            basin_id: basin_id.into(),
            experiment: experiment.into(),
            model: model.into(),
            step: step.into(),
            year_month,
        }
    }

    pub fn chain_key(&self) -> ChainKey {
        ChainKey {
            basin_id: self.basin_id.clone(),
            experiment: self.experiment.clone(),
            model: self.model.clone(),
            step: self.step.clone(),
        }
    }

    /// Same chain, one month later.
    pub fn successor(&self) -> Self {
        self.at(self.year_month.next())
    }

    /// Same chain, one month earlier.
    pub fn predecessor(&self) -> Self {
        self.at(self.year_month.prev())
    }

    fn at(&self, year_month: YearMonth) -> Self {
        Self {
            year_month,
            ..self.clone()
        }
    }

    /// `<basin>_<experiment>_<model>_<step>_<YYYY-MM>`, shared by every
    /// artifact file name of this unit.
    pub fn file_stem(&self) -> String {
        format!(
            "pfaf_{}_{}_{}_{}_{}",
            self.basin_id, self.experiment, self.model, self.step, self.year_month
        )
    }

    /// Remote folder holding this unit's artifacts.
    pub fn remote_prefix(&self) -> String {
        format!(
            "pfaf_{}/{}/{}/{}/{}",
            self.basin_id, self.experiment, self.model, self.step, self.year_month
        )
    }
}

impl fmt::Display for SimulationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote_prefix())
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pfaf_{}/{}/{}/{}",
            self.basin_id, self.experiment, self.model, self.step
        )
    }
}

/// Structured request sent to the compute collaborator.
///
/// Field names are the wire names consumed by the deployed workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub basin_id: String,
    #[serde(rename = "lsm_exp")]
    pub experiment: String,
    #[serde(rename = "lsm_mod")]
    pub model: String,
    #[serde(rename = "lsm_stp")]
    pub step: String,
    #[serde(rename = "yyyy_mm")]
    pub year_month: YearMonth,
    #[serde(rename = "s3_name")]
    pub bucket: String,
}

impl ComputeRequest {
    pub fn for_unit(unit: &SimulationUnit, bucket: impl Into<String>) -> Self {
        Self {
            basin_id: unit.basin_id.clone(),
            experiment: unit.experiment.clone(),
            model: unit.model.clone(),
            step: unit.step.clone(),
            year_month: unit.year_month,
            bucket: bucket.into(),
        }
    }

    pub fn unit(&self) -> SimulationUnit {
        SimulationUnit::new(
            self.basin_id.clone(),
            self.experiment.clone(),
            self.model.clone(),
            self.step.clone(),
            self.year_month,
        )
    }

    /// Canonical JSON body; identical requests always serialize identically.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "basin_id": self.basin_id,
            "lsm_exp": self.experiment,
            "lsm_mod": self.model,
            "lsm_stp": self.step,
            "s3_name": self.bucket,
            "yyyy_mm": self.year_month.to_string(),
        })
        .to_string()
    }

    /// Content-based identity used by the compute side to collapse
    /// duplicate deliveries.
    pub fn dedup_key(&self) -> String {
        blake3::hash(self.to_json().as_bytes()).to_hex().to_string()
    }
}
