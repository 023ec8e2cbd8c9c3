//! Blob storage capability and backends.
//!
//! [`StorePool`] abstracts over local filesystem, GCS, and S3 through the
//! `object_store` crate, caching one handle per bucket so repeated runs in
//! the same process share connections. Handles are created lazily and never
//! mutated after construction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{BackendSnafu, ObjectStoreSnafu, StoreError};

/// Capability interface for object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether the bucket exists and is reachable.
    async fn exists(&self, bucket: &str) -> Result<bool, StoreError>;

    /// Read an object's contents.
    async fn read(&self, bucket: &str, path: &str) -> Result<Bytes, StoreError>;

    /// Write an object, overwriting any existing object at the path.
    async fn write(&self, bucket: &str, path: &str, data: Bytes) -> Result<(), StoreError>;
}

/// Which storage backend bucket names resolve against.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Buckets are directories under a local root. The bucket directory
    /// must already exist; object parents are created as needed.
    Local { root: PathBuf },
    Gcs,
    S3,
}

/// Blob store with one cached `object_store` handle per bucket.
pub struct StorePool {
    backend: StoreBackend,
    handles: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl StorePool {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::new(StoreBackend::Local { root: root.into() })
    }

    /// Get or create the handle for a bucket.
    fn handle(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = handles.get(bucket) {
            return Ok(handle.clone());
        }

        debug!("Opening storage handle for bucket {bucket}");
        let handle: Arc<dyn ObjectStore> = match &self.backend {
            StoreBackend::Local { root } => Arc::new(
                LocalFileSystem::new_with_prefix(root.join(bucket)).context(BackendSnafu {
                    bucket: bucket.to_string(),
                })?,
            ),
            StoreBackend::Gcs => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .context(BackendSnafu {
                        bucket: bucket.to_string(),
                    })?,
            ),
            StoreBackend::S3 => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .context(BackendSnafu {
                        bucket: bucket.to_string(),
                    })?,
            ),
        };
        handles.insert(bucket.to_string(), handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl BlobStore for StorePool {
    async fn exists(&self, bucket: &str) -> Result<bool, StoreError> {
        match &self.backend {
            StoreBackend::Local { root } => Ok(root.join(bucket).is_dir()),
            _ => {
                // Probe the bucket with a single listing call.
                let handle = self.handle(bucket)?;
                match handle.list_with_delimiter(None).await {
                    Ok(_) => Ok(true),
                    Err(object_store::Error::NotFound { .. }) => Ok(false),
                    Err(source) => Err(StoreError::ObjectStore { source }),
                }
            }
        }
    }

    async fn read(&self, bucket: &str, path: &str) -> Result<Bytes, StoreError> {
        let handle = self.handle(bucket)?;
        let result = handle
            .get(&Path::from(path))
            .await
            .context(ObjectStoreSnafu)?;
        result.bytes().await.context(ObjectStoreSnafu)
    }

    async fn write(&self, bucket: &str, path: &str, data: Bytes) -> Result<(), StoreError> {
        let handle = self.handle(bucket)?;
        handle
            .put(&Path::from(path), PutPayload::from(data))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pool_with_bucket(bucket: &str) -> (TempDir, StorePool) {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join(bucket)).unwrap();
        let pool = StorePool::local(temp_dir.path());
        (temp_dir, pool)
    }

    #[tokio::test]
    async fn test_exists_reports_bucket_presence() {
        let (_dir, pool) = pool_with_bucket("data");
        assert!(pool.exists("data").await.unwrap());
        assert!(!pool.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (dir, pool) = pool_with_bucket("data");

        pool.write("data", "stocks/a.ndjson", Bytes::from_static(b"{\"a\":1}\n"))
            .await
            .unwrap();

        let bytes = pool.read("data", "stocks/a.ndjson").await.unwrap();
        assert_eq!(bytes.as_ref(), b"{\"a\":1}\n");
        assert!(dir.path().join("data/stocks/a.ndjson").exists());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, pool) = pool_with_bucket("data");
        let err = pool.read("data", "nope.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_overwrites_existing_object() {
        let (_dir, pool) = pool_with_bucket("data");
        pool.write("data", "k", Bytes::from_static(b"old"))
            .await
            .unwrap();
        pool.write("data", "k", Bytes::from_static(b"new"))
            .await
            .unwrap();
        assert_eq!(pool.read("data", "k").await.unwrap().as_ref(), b"new");
    }
}
