// src/units/mod.rs

//! Value objects describing what is simulated and where its files live.
//!
//! - [`year_month`]: calendar month arithmetic with year rollover.
//! - [`unit`]: the five-tuple `SimulationUnit`, its chain key and the
//!   compute request wire format.
//! - [`storage_keys`]: `ArtifactRef` and the stable remote key layout.

pub mod storage_keys;
pub mod unit;
pub mod year_month;

pub use storage_keys::{ArtifactKind, ArtifactRef};
pub use unit::{ChainKey, ComputeRequest, SimulationUnit};
pub use year_month::YearMonth;
