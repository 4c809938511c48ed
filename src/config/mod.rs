// src/config/mod.rs

//! Configuration loading and validation for rapid-batch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like year ranges and the arch -> endpoint
//!   mapping (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{ConfigOverrides, load_and_validate, load_from_path, load_with_overrides};
pub use model::{
    AwsSection, BatchConfig, BatchSection, ChainSection, DatasetSection, EndpointConfig,
    ExperimentConfig, RawBatchConfig, RetrySection, WorkerSection,
};
