// src/store/memory.rs

//! In-memory object store with fault injection.
//!
//! Objects live in a shared map so clones of one gate observe the same
//! bucket. Faults model the conditions the orchestrator has to survive:
//! delayed visibility, credentials that expire mid-run, and a remote size
//! that disagrees with what was uploaded.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{BatchError, Result};
use crate::store::ObjectStoreGate;
use crate::types::BoxFuture;

#[derive(Debug, Default)]
struct GateState {
    objects: HashMap<String, Vec<u8>>,
    /// Remaining `exists` calls that report `false` for a present object.
    hidden_for: HashMap<String, u32>,
    /// Remaining `exists` calls for a key that fail with a storage error.
    failing_checks: HashMap<String, u32>,
    /// Signed adjustment applied to the reported size of a key.
    size_skew: HashMap<String, i64>,
    /// Remote calls allowed before every call fails with a credential error.
    credential_budget: Option<u32>,
    exists_calls: HashMap<String, u32>,
    uploads: Vec<String>,
    downloads: Vec<String>,
    deleted_local: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGate {
    state: Arc<Mutex<GateState>>,
}

impl MemoryGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an object directly, bypassing upload bookkeeping.
    pub fn put(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.state().objects.insert(key.into(), bytes.into());
    }

    pub fn remove(&self, key: &str) {
        self.state().objects.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The next `checks` existence checks of `key` report absent even if
    /// the object is present.
    pub fn hide_for(&self, key: impl Into<String>, checks: u32) {
        self.state().hidden_for.insert(key.into(), checks);
    }

    /// The next `checks` existence checks of `key` fail with a non-fatal
    /// storage error, as a throttled request would.
    pub fn fail_checks(&self, key: impl Into<String>, checks: u32) {
        self.state().failing_checks.insert(key.into(), checks);
    }

    /// Report the size of `key` off by `delta` bytes.
    pub fn skew_size(&self, key: impl Into<String>, delta: i64) {
        self.state().size_skew.insert(key.into(), delta);
    }

    /// Allow `calls` more remote calls, then fail every call with
    /// `ExpiredToken`.
    pub fn expire_credentials_after(&self, calls: u32) {
        self.state().credential_budget = Some(calls);
    }

    /// Number of `exists` calls made for `key`.
    pub fn exists_calls(&self, key: &str) -> u32 {
        self.state().exists_calls.get(key).copied().unwrap_or(0)
    }

    pub fn uploads(&self) -> Vec<String> {
        self.state().uploads.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.state().downloads.clone()
    }

    pub fn deleted_local(&self) -> Vec<String> {
        self.state().deleted_local.clone()
    }

    fn charge_call(&self) -> Result<()> {
        let mut state = self.state();
        match state.credential_budget {
            Some(0) => Err(BatchError::Credential(
                "ExpiredToken: the provided token has expired".to_string(),
            )),
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check_exists(&self, key: &str) -> Result<bool> {
        self.charge_call()?;
        let mut state = self.state();
        *state.exists_calls.entry(key.to_string()).or_insert(0) += 1;

        if let Some(remaining) = state.failing_checks.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BatchError::storage("exists", key, "SlowDown: throttled"));
            }
        }

        if let Some(remaining) = state.hidden_for.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state.objects.contains_key(key))
    }

    fn reported_size(&self, key: &str) -> Result<u64> {
        self.charge_call()?;
        let state = self.state();
        let Some(bytes) = state.objects.get(key) else {
            return Err(BatchError::storage("size", key, "object not found"));
        };
        let skew = state.size_skew.get(key).copied().unwrap_or(0);
        let len = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
        Ok(u64::try_from(len.saturating_add(skew)).unwrap_or(0))
    }
}

impl ObjectStoreGate for MemoryGate {
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.check_exists(key) })
    }

    fn size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { self.reported_size(key) })
    }

    fn upload<'a>(&'a self, local_path: &'a Path, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.charge_call()?;
            let bytes = tokio::fs::read(local_path).await?;
            let mut state = self.state();
            state.objects.insert(key.to_string(), bytes);
            state.uploads.push(key.to_string());
            Ok(())
        })
    }

    fn download<'a>(&'a self, key: &'a str, local_path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.charge_call()?;
            let bytes = {
                let mut state = self.state();
                let Some(bytes) = state.objects.get(key).cloned() else {
                    return Err(BatchError::storage("download", key, "object not found"));
                };
                state.downloads.push(key.to_string());
                bytes
            };
            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(local_path, bytes).await?;
            Ok(())
        })
    }

    fn delete_local<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::fs::remove_file(path).await?;
            self.state()
                .deleted_local
                .push(path.to_string_lossy().into_owned());
            Ok(())
        })
    }
}
