use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::Deserialize;

/// Boxed future used at the collaborator seams (gate, invoker, trigger).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a compute endpoint is reached.
///
/// - `Sqs`: a message is posted to a (FIFO) queue; the consumer runs the unit.
/// - `Lambda`: the function is invoked directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Sqs,
    Lambda,
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqs" => Ok(EndpointKind::Sqs),
            "lambda" => Ok(EndpointKind::Lambda),
            other => Err(format!(
                "invalid endpoint kind: {other} (expected \"sqs\" or \"lambda\")"
            )),
        }
    }
}

/// Which part of the per-month pipeline a worker performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStage {
    /// Forcing-volume + initial-state -> output-series + final-state.
    Routing,
    /// Land-surface forcing download -> forcing-volume.
    Volume,
}

impl Default for WorkerStage {
    fn default() -> Self {
        WorkerStage::Routing
    }
}

/// Artifact whose remote presence marks a unit as complete in the
/// dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessTarget {
    ForcingVolume,
    OutputSeries,
}

impl Default for ReadinessTarget {
    fn default() -> Self {
        ReadinessTarget::ForcingVolume
    }
}
