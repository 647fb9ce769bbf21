/// In-memory blob storage backend
use crate::{
    blob_store::BlobBackend,
    error::{InariError, InariResult},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local object store
///
/// Clones share the same objects. Used by tests and when `INARI_BLOBSTORE=memory`.
#[derive(Clone, Default)]
pub struct MemoryBlobBackend {
    objects: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an object; the event log itself never does this, tests do
    pub async fn remove(&self, key: &str, bucket: &str) -> bool {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    /// Number of objects across all buckets
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> InariResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn read_object(&self, key: &str, bucket: &str) -> InariResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| InariError::NotFound(format!("Object not found: {}/{}", bucket, key)))
    }

    async fn write_object(
        &self,
        key: &str,
        bucket: &str,
        data: Vec<u8>,
        _is_private: bool,
    ) -> InariResult<()> {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }
}
