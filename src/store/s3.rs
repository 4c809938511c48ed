// src/store/s3.rs

use std::path::Path;

use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::errors::{BatchError, Result};
use crate::store::ObjectStoreGate;
use crate::store::aws::{SdkFailure, classify};
use crate::types::BoxFuture;

/// [`ObjectStoreGate`] backed by one S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Gate {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Gate {
    pub fn new(sdk_config: &SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head(&self, key: &str) -> std::result::Result<Option<u64>, SdkFailure> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let len = output.content_length().unwrap_or(0);
                Ok(Some(u64::try_from(len).unwrap_or(0)))
            }
            Err(err) => match classify(&err) {
                SdkFailure::NotFound => Ok(None),
                other => Err(other),
            },
        }
    }
}

impl ObjectStoreGate for S3Gate {
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let found = self
                .head(key)
                .await
                .map_err(|failure| failure.into_error("exists", key))?;
            debug!(bucket = %self.bucket, key, found = found.is_some(), "head_object");
            Ok(found.is_some())
        })
    }

    fn size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            match self.head(key).await {
                Ok(Some(size)) => Ok(size),
                Ok(None) => Err(SdkFailure::NotFound.into_error("size", key)),
                Err(failure) => Err(failure.into_error("size", key)),
            }
        })
    }

    fn upload<'a>(&'a self, local_path: &'a Path, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let body = ByteStream::from_path(local_path)
                .await
                .map_err(|err| BatchError::storage("upload", key, err.to_string()))?;

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|err| classify(&err).into_error("upload", key))?;

            debug!(bucket = %self.bucket, key, path = %local_path.display(), "put_object");
            Ok(())
        })
    }

    fn download<'a>(&'a self, key: &'a str, local_path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| classify(&err).into_error("download", key))?;

            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut body = output.body.into_async_read();
            let mut file = tokio::fs::File::create(local_path).await?;
            tokio::io::copy(&mut body, &mut file).await?;

            debug!(bucket = %self.bucket, key, path = %local_path.display(), "get_object");
            Ok(())
        })
    }
}
