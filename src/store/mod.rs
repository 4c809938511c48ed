// src/store/mod.rs

//! Object store gate.
//!
//! Every remote effect of the orchestrator goes through [`ObjectStoreGate`],
//! so the S3 implementation can be swapped for [`memory::MemoryGate`] in
//! tests.
//!
//! Implementations must keep two conditions apart:
//! - a missing object: `exists` returns `Ok(false)`, a normal polling state;
//! - rejected credentials: `BatchError::Credential`, which callers never
//!   retry.

use std::path::Path;

use crate::errors::Result;
use crate::types::BoxFuture;

pub mod aws;
pub mod memory;
pub mod s3;

pub use memory::MemoryGate;
pub use s3::S3Gate;

pub trait ObjectStoreGate: Send + Sync {
    /// Single existence check for `key`.
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Size in bytes of the remote object.
    fn size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64>>;

    fn upload<'a>(&'a self, local_path: &'a Path, key: &'a str) -> BoxFuture<'a, Result<()>>;

    fn download<'a>(&'a self, key: &'a str, local_path: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Remove a local scratch file.
    fn delete_local<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::fs::remove_file(path).await?;
            Ok(())
        })
    }
}
