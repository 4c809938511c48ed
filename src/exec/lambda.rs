// src/exec/lambda.rs

//! Synchronous remote invocation of the routing function.

use std::time::Duration;

use aws_config::SdkConfig;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::backend::{RunReport, SimulationInvoker, StagedInputs};
use crate::store::aws::{SdkFailure, classify};
use crate::types::BoxFuture;
use crate::units::{ComputeRequest, SimulationUnit};

/// Response body returned by the deployed routing function.
#[derive(Debug, Clone, Default, Deserialize)]
struct FunctionResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    profiling: Option<Profiling>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Profiling {
    #[serde(default)]
    runtime_total_sec: Option<f64>,
    #[serde(default, rename = "memory_max_MB")]
    memory_max_mb: Option<f64>,
}

/// Extract `(duration, peak memory)` from a response body. Unparsable
/// bodies yield `None`s rather than failing a successful run.
fn parse_profiling(body: &[u8]) -> (Option<Duration>, Option<f64>) {
    let Ok(response) = serde_json::from_slice::<FunctionResponse>(body) else {
        return (None, None);
    };
    if let Some(status) = &response.status {
        if status != "Success" {
            warn!(status = %status, "routing function reported non-success status");
        }
    }
    let profiling = response.profiling.unwrap_or_default();
    let duration = profiling
        .runtime_total_sec
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);
    (duration, profiling.memory_max_mb)
}

#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
    function: String,
    bucket: String,
}

impl LambdaInvoker {
    pub fn new(sdk_config: &SdkConfig, function: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(sdk_config),
            function: function.into(),
            bucket: bucket.into(),
        }
    }
}

impl SimulationInvoker for LambdaInvoker {
    fn run<'a>(
        &'a self,
        unit: &'a SimulationUnit,
        _inputs: &'a StagedInputs,
    ) -> BoxFuture<'a, Result<RunReport>> {
        Box::pin(async move {
            let request = ComputeRequest::for_unit(unit, &self.bucket);
            info!(unit = %unit, function = %self.function, "invoking routing function");

            let started = Instant::now();
            let output = self
                .client
                .invoke()
                .function_name(&self.function)
                .invocation_type(InvocationType::RequestResponse)
                .payload(Blob::new(request.to_json()))
                .send()
                .await
                .map_err(|err| match classify(&err) {
                    SdkFailure::Credential(message) => BatchError::Credential(message),
                    SdkFailure::NotFound => BatchError::Compute {
                        unit: unit.to_string(),
                        diagnostic: format!("function '{}' not found", self.function),
                    },
                    SdkFailure::Other(message) => BatchError::Compute {
                        unit: unit.to_string(),
                        diagnostic: message,
                    },
                })?;
            let elapsed = started.elapsed();

            let body: &[u8] = output
                .payload()
                .map(AsRef::<[u8]>::as_ref)
                .unwrap_or_default();
            if let Some(kind) = output.function_error() {
                return Err(BatchError::Compute {
                    unit: unit.to_string(),
                    diagnostic: format!("{kind}: {}", String::from_utf8_lossy(body)),
                });
            }

            let (reported, peak_memory_mb) = parse_profiling(body);
            let duration = reported.unwrap_or(elapsed);
            info!(
                unit = %unit,
                elapsed_ms = duration.as_millis() as u64,
                peak_memory_mb = peak_memory_mb.unwrap_or_default(),
                "routing function returned"
            );

            Ok(RunReport {
                outputs: Vec::new(),
                duration,
                peak_memory_mb,
            })
        })
    }

    fn is_local(&self) -> bool {
        false
    }
}
