/// Blob Storage System
///
/// Flat key/value object storage holding the event log (the source of truth)
/// and uploaded media files. Supports multiple backend implementations
/// (disk, in-memory, S3).

pub mod disk;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use disk::DiskBlobBackend;
pub use memory::MemoryBlobBackend;

use crate::error::{InariError, InariResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Blob storage backend trait
///
/// Keys are `/`-separated paths inside a bucket. Listing order is
/// unspecified; callers must not rely on it.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// List every key in `bucket` starting with `prefix`
    async fn list_keys(&self, bucket: &str, prefix: &str) -> InariResult<Vec<String>>;

    /// Read an object, failing with `NotFound` when it is absent
    async fn read_object(&self, key: &str, bucket: &str) -> InariResult<Vec<u8>>;

    /// Write an object, replacing any previous content under the key
    async fn write_object(
        &self,
        key: &str,
        bucket: &str,
        data: Vec<u8>,
        is_private: bool,
    ) -> InariResult<()>;
}

/// Backend types for blob storage
#[derive(Debug, Clone)]
pub enum BlobBackendType {
    /// Store objects on local disk, one sub-directory per bucket
    Disk { location: PathBuf },

    /// Keep objects in process memory (tests and tooling)
    Memory,

    /// Store objects in S3-compatible storage
    S3 {
        region: String,
        access_key_id: String,
        secret_access_key: String,
        endpoint: Option<String>,
    },
}

/// Build the configured backend
pub async fn open_backend(backend: &BlobBackendType) -> InariResult<Arc<dyn BlobBackend>> {
    match backend {
        BlobBackendType::Disk { location } => {
            tracing::info!("Using disk blob storage at {}", location.display());
            Ok(Arc::new(DiskBlobBackend::new(location.clone())))
        }
        BlobBackendType::Memory => {
            tracing::warn!("Using in-memory blob storage; the event log will not survive a restart");
            Ok(Arc::new(MemoryBlobBackend::new()))
        }
        #[cfg(feature = "s3")]
        BlobBackendType::S3 {
            region,
            access_key_id,
            secret_access_key,
            endpoint,
        } => {
            let backend = s3::S3BlobBackend::new(s3::S3Config {
                region: region.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                endpoint: endpoint.clone(),
            })
            .await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "s3"))]
        BlobBackendType::S3 { .. } => Err(InariError::Config(
            "S3 blob storage requires building with the `s3` feature".to_string(),
        )),
    }
}
