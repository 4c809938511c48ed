// src/exec/mod.rs

//! Compute collaborators.
//!
//! - [`backend`] defines the `SimulationInvoker` trait and the value types
//!   passed across it.
//! - [`process`] runs the routing executable locally through `sh -c`.
//! - [`lambda`] invokes the routing function synchronously.
//! - [`trigger`] posts fire-and-forget compute requests (SQS or async
//!   Lambda) for the dispatch queue.
//! - [`zero_state`] derives the chain origin's zero-valued state.
//! - [`forcing`] and [`volume`] implement the worker's volume stage.

pub mod backend;
pub mod forcing;
pub mod lambda;
pub mod process;
pub mod trigger;
pub mod volume;
pub mod zero_state;

pub use backend::{LocalArtifact, RunReport, SimulationInvoker, StagedInputs};
pub use forcing::{CommandForcingSource, ForcingQuery, ForcingSource};
pub use lambda::LambdaInvoker;
pub use process::ProcessInvoker;
pub use trigger::{ComputeTrigger, LambdaEventTrigger, SqsTrigger};
pub use volume::{VolumeOutcome, VolumeWorker};
pub use zero_state::{CommandZeroState, ZeroStateWriter};
