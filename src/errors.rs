// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! "Not found yet" is deliberately absent: a missing remote object is a
//! polling state (`exists() == false`), never an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Expired or invalid credentials. Never retried.
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Compute error for {unit}: {diagnostic}")]
    Compute { unit: String, diagnostic: String },

    #[error(
        "Publish verification failed for {key}: local size {local_size} bytes, remote size {}",
        describe_size(.remote_size)
    )]
    PublishVerification {
        key: String,
        local_size: u64,
        remote_size: Option<u64>,
    },

    #[error("Expected output missing for {unit}: {path}")]
    MissingOutput { unit: String, path: String },

    #[error("Dispatch queue gave up after {passes} passes with {remaining} unit(s) pending")]
    QueueExhausted { passes: u32, remaining: usize },

    #[error("Storage error during {op} of '{key}': {message}")]
    Storage {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchError {
    /// Fatal errors abort the whole batch run instead of a single chain.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BatchError::Credential(_) | BatchError::ConfigError(_))
    }

    pub fn storage(op: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        BatchError::Storage {
            op,
            key: key.into(),
            message: message.into(),
        }
    }
}

fn describe_size(size: &Option<u64>) -> String {
    match size {
        Some(bytes) => format!("{bytes} bytes"),
        None => "unavailable".to_string(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_credential_and_config_errors_are_fatal() {
        assert!(BatchError::Credential("ExpiredToken".into()).is_fatal());
        assert!(BatchError::ConfigError("bad".into()).is_fatal());
        assert!(
            !BatchError::Compute {
                unit: "pfaf_74/GLDAS/VIC/3H/1980-01".into(),
                diagnostic: "exit 1".into()
            }
            .is_fatal()
        );
        assert!(
            !BatchError::PublishVerification {
                key: "k".into(),
                local_size: 10,
                remote_size: Some(9)
            }
            .is_fatal()
        );
    }

    #[test]
    fn publish_verification_message_reports_both_sizes() {
        let err = BatchError::PublishVerification {
            key: "pfaf_74/x.nc".into(),
            local_size: 10,
            remote_size: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("local size 10 bytes"));
        assert!(msg.contains("unavailable"));
    }
}
