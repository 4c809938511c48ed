// src/exec/forcing.rs

//! Data-download collaborator: fetches land-surface-model granules for one
//! month. Zero results is a valid answer; callers check the count.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::DatasetSection;
use crate::errors::{BatchError, Result};
use crate::exec::process::{diagnostic, render_command, run_shell};
use crate::types::BoxFuture;
use crate::units::SimulationUnit;

/// One search request.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingQuery {
    pub short_name: String,
    /// `[west, south, east, north]`.
    pub bounding_box: [f64; 4],
    pub count: u32,
    /// Half-open `[start, end)` window, ISO 8601.
    pub temporal: (String, String),
    pub dest_dir: PathBuf,
}

impl ForcingQuery {
    pub fn for_unit(unit: &SimulationUnit, dataset: &DatasetSection, dest_dir: &Path) -> Self {
        let short_name = dataset
            .short_name
            .replace("{model}", &unit.model)
            .replace("{step}", &unit.step)
            .replace("{experiment}", &unit.experiment);
        Self {
            short_name,
            bounding_box: dataset.bounding_box,
            count: dataset.count,
            temporal: unit.year_month.temporal_window(),
            dest_dir: dest_dir.to_path_buf(),
        }
    }
}

pub trait ForcingSource: Send + Sync {
    fn fetch<'a>(&'a self, query: &'a ForcingQuery) -> BoxFuture<'a, Result<Vec<PathBuf>>>;
}

/// Runs `[worker].fetch_cmd`; the command prints one downloaded path per
/// line on stdout.
#[derive(Debug, Clone)]
pub struct CommandForcingSource {
    cmd: String,
}

impl CommandForcingSource {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    fn render(&self, query: &ForcingQuery) -> String {
        let [west, south, east, north] = query.bounding_box;
        render_command(
            &self.cmd,
            &[
                ("short_name", query.short_name.clone()),
                ("start", query.temporal.0.clone()),
                ("end", query.temporal.1.clone()),
                ("west", west.to_string()),
                ("south", south.to_string()),
                ("east", east.to_string()),
                ("north", north.to_string()),
                ("count", query.count.to_string()),
                ("dest", query.dest_dir.display().to_string()),
            ],
        )
    }
}

fn parse_paths(stdout: &[u8]) -> Vec<PathBuf> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl ForcingSource for CommandForcingSource {
    fn fetch<'a>(&'a self, query: &'a ForcingQuery) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move {
            let cmd = self.render(query);
            debug!(cmd = %cmd, "fetching forcing granules");

            let output = run_shell(&cmd).await?;
            if !output.status.success() {
                return Err(BatchError::Compute {
                    unit: query.short_name.clone(),
                    diagnostic: format!("download command failed: {}", diagnostic(&output)),
                });
            }

            let paths = parse_paths(&output.stdout);
            info!(
                short_name = %query.short_name,
                start = %query.temporal.0,
                files = paths.len(),
                "download finished"
            );
            Ok(paths)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ForcingQuery {
        let unit = SimulationUnit::new("74", "GLDAS", "VIC", "3H", "1980-12".parse().unwrap());
        ForcingQuery::for_unit(&unit, &DatasetSection::default(), Path::new("/data"))
    }

    #[test]
    fn query_uses_dataset_and_rollover_window() {
        let q = query();
        assert_eq!(q.short_name, "GLDAS_VIC10_3H");
        assert_eq!(q.count, 10);
        assert_eq!(q.bounding_box, [-180.0, -60.0, 180.0, 90.0]);
        assert_eq!(q.temporal.1, "1981-01-01T00:00:00");
    }

    #[test]
    fn renders_search_parameters() {
        let source = CommandForcingSource::new("fetch {short_name} {start} {west},{south},{east},{north} -n {count}");
        assert_eq!(
            source.render(&query()),
            "fetch GLDAS_VIC10_3H 1980-12-01T00:00:00 -180,-60,180,90 -n 10"
        );
    }

    #[tokio::test]
    async fn fetch_returns_printed_paths() {
        let source = CommandForcingSource::new("printf '/data/a.nc4\\n\\n/data/b.nc4\\n'");
        let paths = source.fetch(&query()).await.unwrap();
        assert_eq!(paths, vec![PathBuf::from("/data/a.nc4"), PathBuf::from("/data/b.nc4")]);
    }

    #[tokio::test]
    async fn empty_output_is_zero_results() {
        let source = CommandForcingSource::new("true");
        assert!(source.fetch(&query()).await.unwrap().is_empty());
    }
}
