// src/plan.rs

//! Task enumeration: expands a configuration into the ordered list of
//! simulation units.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use tracing::{debug, warn};

use crate::config::{BatchConfig, ExperimentConfig};
use crate::units::{SimulationUnit, YearMonth};

/// Cartesian expansion of basin x year x month x experiment x model x step.
///
/// Holds its inputs explicitly; nothing is read from process-wide state.
#[derive(Debug, Clone)]
pub struct TaskEnumerator {
    basins: Vec<String>,
    years: RangeInclusive<i32>,
    months: Vec<u8>,
    experiments: Vec<String>,
    mapping: BTreeMap<String, ExperimentConfig>,
}

impl TaskEnumerator {
    pub fn new(
        basins: Vec<String>,
        years: RangeInclusive<i32>,
        months: Vec<u8>,
        experiments: Vec<String>,
        mapping: BTreeMap<String, ExperimentConfig>,
    ) -> Self {
        Self {
            basins,
            years,
            months,
            experiments,
            mapping,
        }
    }

    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self::new(
            cfg.batch.basins.clone(),
            cfg.batch.start_year..=cfg.batch.end_year,
            cfg.months().to_vec(),
            cfg.batch.experiments.clone(),
            cfg.experiments.clone(),
        )
    }

    /// Models and steps for an experiment; unknown experiments map to empty
    /// sets and therefore contribute no units.
    fn models_and_steps(&self, experiment: &str) -> (&[String], &[String]) {
        match self.mapping.get(experiment) {
            Some(exp) => (exp.models.as_slice(), exp.steps.as_slice()),
            None => (&[], &[]),
        }
    }

    /// Iteration order, outer to inner: basin, year, month, experiment,
    /// model, step.
    pub fn enumerate(&self) -> Vec<SimulationUnit> {
        let mut units = Vec::new();

        for experiment in self.experiments.iter() {
            if !self.mapping.contains_key(experiment) {
                warn!(experiment = %experiment, "skipping experiment with no model/step mapping");
            }
        }

        for basin in self.basins.iter() {
            for year in self.years.clone() {
                for &month in self.months.iter() {
                    let Ok(year_month) = YearMonth::new(year, month) else {
                        warn!(year, month, "skipping invalid year-month");
                        continue;
                    };
                    for experiment in self.experiments.iter() {
                        let (models, steps) = self.models_and_steps(experiment);
                        for model in models {
                            for step in steps {
                                units.push(SimulationUnit::new(
                                    basin.clone(),
                                    experiment.clone(),
                                    model.clone(),
                                    step.clone(),
                                    year_month,
                                ));
                            }
                        }
                    }
                }
            }
        }

        debug!(count = units.len(), "enumerated simulation units");
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::builtin_experiments;

    fn enumerator(experiments: &[&str], months: Vec<u8>) -> TaskEnumerator {
        TaskEnumerator::new(
            vec!["74".to_string(), "11".to_string()],
            1980..=1981,
            months,
            experiments.iter().map(|s| s.to_string()).collect(),
            builtin_experiments(),
        )
    }

    #[test]
    fn expands_full_cartesian_product() {
        let units = enumerator(&["GLDAS", "NLDAS"], vec![1, 2]).enumerate();
        // 2 basins x 2 years x 2 months x (1x1 + 3x2) combos
        assert_eq!(units.len(), 2 * 2 * 2 * 7);
    }

    #[test]
    fn iteration_order_is_basin_year_month_experiment_model_step() {
        let units = enumerator(&["NLDAS"], vec![1, 2]).enumerate();
        let labels: Vec<String> = units.iter().take(7).map(|u| u.to_string()).collect();
        assert_eq!(
            labels,
            vec![
                "pfaf_74/NLDAS/VIC/H/1980-01",
                "pfaf_74/NLDAS/VIC/M/1980-01",
                "pfaf_74/NLDAS/NOAH/H/1980-01",
                "pfaf_74/NLDAS/NOAH/M/1980-01",
                "pfaf_74/NLDAS/MOS/H/1980-01",
                "pfaf_74/NLDAS/MOS/M/1980-01",
                "pfaf_74/NLDAS/VIC/H/1980-02",
            ]
        );
        assert_eq!(units.last().unwrap().to_string(), "pfaf_11/NLDAS/MOS/M/1981-02");
    }

    #[test]
    fn unknown_experiment_yields_zero_units() {
        let units = enumerator(&["ERA5"], vec![1]).enumerate();
        assert!(units.is_empty());

        let mixed = enumerator(&["ERA5", "GLDAS"], vec![1]).enumerate();
        assert_eq!(mixed.len(), 2 * 2);
        assert!(mixed.iter().all(|u| u.experiment == "GLDAS"));
    }
}
