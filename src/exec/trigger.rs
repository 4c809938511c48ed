// src/exec/trigger.rs

//! Fire-and-forget compute triggers used by the dispatch queue.
//!
//! Triggers may be re-sent for a unit that is already queued; the compute
//! side collapses duplicates using the request's content-based key.

use aws_config::SdkConfig;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use tracing::info;

use crate::config::EndpointConfig;
use crate::errors::{BatchError, Result};
use crate::store::aws::{SdkFailure, classify};
use crate::types::{BoxFuture, EndpointKind};
use crate::units::ComputeRequest;

pub trait ComputeTrigger: Send + Sync {
    fn trigger<'a>(&'a self, request: &'a ComputeRequest) -> BoxFuture<'a, Result<()>>;
}

fn trigger_error(request: &ComputeRequest, failure: SdkFailure) -> BatchError {
    match failure {
        SdkFailure::Credential(message) => BatchError::Credential(message),
        SdkFailure::NotFound => BatchError::Compute {
            unit: request.unit().to_string(),
            diagnostic: "trigger endpoint not found".to_string(),
        },
        SdkFailure::Other(message) => BatchError::Compute {
            unit: request.unit().to_string(),
            diagnostic: message,
        },
    }
}

/// Sends requests to a FIFO queue.
#[derive(Debug, Clone)]
pub struct SqsTrigger {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    message_group_id: String,
}

impl SqsTrigger {
    pub fn new(
        sdk_config: &SdkConfig,
        queue_url: impl Into<String>,
        message_group_id: impl Into<String>,
    ) -> Self {
        Self {
            client: aws_sdk_sqs::Client::new(sdk_config),
            queue_url: queue_url.into(),
            message_group_id: message_group_id.into(),
        }
    }
}

impl ComputeTrigger for SqsTrigger {
    fn trigger<'a>(&'a self, request: &'a ComputeRequest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dedup_id = request.dedup_key();
            let output = self
                .client
                .send_message()
                .queue_url(&self.queue_url)
                .message_body(request.to_json())
                .message_group_id(&self.message_group_id)
                .message_deduplication_id(&dedup_id)
                .send()
                .await
                .map_err(|err| trigger_error(request, classify(&err)))?;

            info!(
                unit = %request.unit(),
                message_id = output.message_id().unwrap_or_default(),
                dedup_id = %dedup_id,
                "compute trigger queued"
            );
            Ok(())
        })
    }
}

/// Invokes a function asynchronously (`Event` invocation).
#[derive(Debug, Clone)]
pub struct LambdaEventTrigger {
    client: aws_sdk_lambda::Client,
    function: String,
}

impl LambdaEventTrigger {
    pub fn new(sdk_config: &SdkConfig, function: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(sdk_config),
            function: function.into(),
        }
    }
}

impl ComputeTrigger for LambdaEventTrigger {
    fn trigger<'a>(&'a self, request: &'a ComputeRequest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let output = self
                .client
                .invoke()
                .function_name(&self.function)
                .invocation_type(InvocationType::Event)
                .payload(Blob::new(request.to_json()))
                .send()
                .await
                .map_err(|err| trigger_error(request, classify(&err)))?;

            info!(
                unit = %request.unit(),
                function = %self.function,
                status = output.status_code(),
                "compute trigger invoked"
            );
            Ok(())
        })
    }
}

/// Build the trigger for the configured endpoint.
pub fn from_endpoint(sdk_config: &SdkConfig, endpoint: &EndpointConfig) -> Box<dyn ComputeTrigger> {
    match endpoint.kind {
        EndpointKind::Sqs => Box::new(SqsTrigger::new(
            sdk_config,
            &endpoint.target,
            &endpoint.message_group_id,
        )),
        EndpointKind::Lambda => Box::new(LambdaEventTrigger::new(sdk_config, &endpoint.target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::SimulationUnit;

    #[test]
    fn credential_failures_stay_fatal() {
        let unit = SimulationUnit::new("74", "GLDAS", "VIC", "3H", "1980-01".parse().unwrap());
        let request = ComputeRequest::for_unit(&unit, "bucket");

        let fatal = trigger_error(&request, SdkFailure::Credential("ExpiredToken".into()));
        assert!(fatal.is_fatal());

        let soft = trigger_error(&request, SdkFailure::Other("throttled".into()));
        assert!(!soft.is_fatal());
        assert!(soft.to_string().contains("pfaf_74/GLDAS/VIC/3H/1980-01"));
    }
}
