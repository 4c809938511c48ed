// src/engine/mod.rs

//! Orchestration engine for rapid-batch.
//!
//! This module ties together:
//! - the readiness poller (bounded existence checks with a short sleep)
//! - the monthly state chain (month `m` hands its state to month `m + 1`)
//! - the per-unit pipeline (stage, invoke, reconcile)
//! - the post-run reconciler (verified publish, then cleanup)
//! - the dispatch queue (independent units, long sleep between passes)
//!
//! Everything runs sequentially on one task. Coordination with other
//! orchestrator instances and with remote compute happens only through the
//! object store, whose per-unit key namespace keeps writers disjoint.

pub mod chain;
pub mod pipeline;
pub mod poller;
pub mod queue;
pub mod reconcile;

pub use chain::{BatchReport, ChainAbort, ChainReport, ChainRunner, StateChain, UnitInputs, build_chains};
pub use pipeline::{UnitPipeline, UnitRun};
pub use poller::{PollOutcome, ReadinessPoller, RetryState};
pub use queue::{DispatchQueue, DispatchSummary, PassReport, PendingTaskSet};
pub use reconcile::{PostRunReconciler, PublishReport};
