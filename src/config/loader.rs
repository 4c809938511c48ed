// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{BatchConfig, RawBatchConfig};
use crate::errors::Result;

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bucket: Option<String>,
    pub arch: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, raw: &mut RawBatchConfig) {
        if let Some(bucket) = &self.bucket {
            raw.batch.bucket = bucket.clone();
        }
        if let Some(arch) = &self.arch {
            raw.batch.arch = arch.clone();
        }
    }
}

/// Load a configuration file from a given path and return the raw `RawBatchConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawBatchConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawBatchConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BatchConfig> {
    load_with_overrides(path, &ConfigOverrides::default())
}

/// Like [`load_and_validate`], applying CLI overrides before validation so
/// that an overridden `arch` is checked against `[endpoints]` too.
pub fn load_with_overrides(
    path: impl AsRef<Path>,
    overrides: &ConfigOverrides,
) -> Result<BatchConfig> {
    let mut raw_config = load_from_path(&path)?;
    overrides.apply(&mut raw_config);
    let config = BatchConfig::try_from(raw_config)?;
    Ok(config)
}

/// Default config path: `RapidBatch.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("RapidBatch.toml")
}
