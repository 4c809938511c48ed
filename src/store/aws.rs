// src/store/aws.rs

//! Shared AWS plumbing: SDK config loading and error classification for
//! the S3, SQS and Lambda clients.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::config::AwsSection;
use crate::errors::BatchError;

/// Error codes that mean the caller's identity was rejected.
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidToken",
    "InvalidAccessKeyId",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "UnrecognizedClientException",
];

const NOT_FOUND_ERROR_CODES: &[&str] = &["NotFound", "NoSuchKey", "404"];

/// Load region and credentials, honouring a named profile when configured.
pub async fn load_sdk_config(aws: &AwsSection) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// Outcome of classifying an SDK failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SdkFailure {
    NotFound,
    Credential(String),
    Other(String),
}

pub(crate) fn classify<E>(err: &SdkError<E, HttpResponse>) -> SdkFailure
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(err).to_string();
    let code = err.as_service_error().and_then(|e| e.code());
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify_parts(code, status, message)
}

fn classify_parts(code: Option<&str>, status: Option<u16>, message: String) -> SdkFailure {
    if let Some(code) = code {
        if CREDENTIAL_ERROR_CODES.contains(&code) {
            return SdkFailure::Credential(format!("{code}: {message}"));
        }
        if NOT_FOUND_ERROR_CODES.contains(&code) {
            return SdkFailure::NotFound;
        }
    }

    match status {
        Some(404) => return SdkFailure::NotFound,
        Some(403) => return SdkFailure::Credential(format!("HTTP 403: {message}")),
        _ => {}
    }

    // Failures raised before a response exists, e.g. by the credential
    // provider chain, only surface as text.
    let lowered = message.to_lowercase();
    if lowered.contains("expiredtoken") || lowered.contains("credential") {
        return SdkFailure::Credential(message);
    }

    SdkFailure::Other(message)
}

impl SdkFailure {
    /// Convert into a crate error; `NotFound` becomes a storage error since
    /// only `exists` treats absence as a non-error.
    pub(crate) fn into_error(self, op: &'static str, key: &str) -> BatchError {
        match self {
            SdkFailure::Credential(message) => BatchError::Credential(message),
            SdkFailure::NotFound => BatchError::storage(op, key, "object not found"),
            SdkFailure::Other(message) => BatchError::storage(op, key, message),
        }
    }
}
