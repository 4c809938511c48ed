#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use rapid_batch::config::{
    AwsSection, BatchConfig, BatchSection, ChainSection, EndpointConfig, ExperimentConfig,
    RawBatchConfig, RetrySection, WorkerSection,
};
use rapid_batch::types::EndpointKind;

/// Builder for `BatchConfig` to simplify test setup.
///
/// Defaults: bucket `test-bucket`, basin `74`, year 1980, all months,
/// experiment GLDAS (built-in mapping), fast retry settings.
pub struct BatchConfigBuilder {
    config: RawBatchConfig,
}

impl BatchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawBatchConfig {
                batch: BatchSection {
                    bucket: "test-bucket".to_string(),
                    basins: vec!["74".to_string()],
                    start_year: 1980,
                    end_year: 1980,
                    months: (1..=12).map(|m| format!("{m:02}")).collect(),
                    experiments: vec!["GLDAS".to_string()],
                    arch: "x86_64".to_string(),
                },
                retry: RetrySection {
                    interval_secs: 1,
                    max_attempts: 3,
                    rescan_interval_secs: 60,
                    max_passes: None,
                    unit_attempts: 1,
                },
                chain: ChainSection::default(),
                aws: AwsSection::default(),
                experiment: BTreeMap::new(),
                endpoints: BTreeMap::new(),
                worker: WorkerSection::default(),
            },
        }
    }

    pub fn bucket(mut self, bucket: &str) -> Self {
        self.config.batch.bucket = bucket.to_string();
        self
    }

    pub fn basins(mut self, basins: &[&str]) -> Self {
        self.config.batch.basins = basins.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.config.batch.start_year = start;
        self.config.batch.end_year = end;
        self
    }

    pub fn months(mut self, months: &[&str]) -> Self {
        self.config.batch.months = months.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn experiments(mut self, experiments: &[&str]) -> Self {
        self.config.batch.experiments = experiments.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_experiment(mut self, name: &str, models: &[&str], steps: &[&str]) -> Self {
        self.config.experiment.insert(
            name.to_string(),
            ExperimentConfig {
                models: models.iter().map(|m| m.to_string()).collect(),
                steps: steps.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn origin(mut self, origin: &str) -> Self {
        self.config.chain.origin = Some(origin.to_string());
        self
    }

    pub fn retry(mut self, max_attempts: u32, interval_secs: u64) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self.config.retry.interval_secs = interval_secs;
        self
    }

    pub fn unit_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.unit_attempts = attempts;
        self
    }

    pub fn max_passes(mut self, passes: u32) -> Self {
        self.config.retry.max_passes = Some(passes);
        self
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.config.batch.arch = arch.to_string();
        self
    }

    pub fn with_endpoint(mut self, arch: &str, kind: EndpointKind, target: &str) -> Self {
        self.config.endpoints.insert(
            arch.to_string(),
            EndpointConfig {
                kind,
                target: target.to_string(),
                message_group_id: "default-group".to_string(),
            },
        );
        self
    }

    pub fn scratch_dir(mut self, dir: &Path) -> Self {
        self.config.worker.scratch_dir = dir.to_path_buf();
        self
    }

    pub fn raw(self) -> RawBatchConfig {
        self.config
    }

    pub fn build(self) -> BatchConfig {
        BatchConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
