/// Disk-based blob storage backend
use crate::{
    blob_store::BlobBackend,
    error::{InariError, InariResult},
};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Disk storage backend
///
/// Each bucket is a directory under the base path and each key is a relative
/// path inside it, so `events/2019/20190128131313.0000_<id>.json` lands at
/// `{base}/{bucket}/events/2019/20190128131313.0000_<id>.json`.
#[derive(Clone)]
pub struct DiskBlobBackend {
    base_path: PathBuf,
}

impl DiskBlobBackend {
    /// Create a new disk storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn bucket_path(&self, bucket: &str) -> InariResult<PathBuf> {
        Ok(self.base_path.join(Self::checked_relative(bucket)?))
    }

    /// Get the file path for a key
    fn get_object_path(&self, key: &str, bucket: &str) -> InariResult<PathBuf> {
        Ok(self.bucket_path(bucket)?.join(Self::checked_relative(key)?))
    }

    /// Reject absolute paths and `..` so keys cannot escape the bucket
    fn checked_relative(name: &str) -> InariResult<&Path> {
        let path = Path::new(name);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(InariError::BlobStorage(format!("Invalid object path: {:?}", name)));
        }
        Ok(path)
    }

    /// Collect every file below `dir` as a `/`-joined key relative to `root`
    async fn walk(root: &Path, dir: PathBuf, keys: &mut Vec<String>) -> InariResult<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(InariError::BlobStorage(format!(
                        "Failed to list {}: {}",
                        dir.display(),
                        e
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobBackend for DiskBlobBackend {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> InariResult<Vec<String>> {
        let root = self.bucket_path(bucket)?;
        let mut keys = Vec::new();
        Self::walk(&root, root.clone(), &mut keys).await?;
        keys.retain(|key| key.starts_with(prefix) && !key.ends_with(".tmp"));
        Ok(keys)
    }

    async fn read_object(&self, key: &str, bucket: &str) -> InariResult<Vec<u8>> {
        let path = self.get_object_path(key, bucket)?;

        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(InariError::NotFound(format!("Object not found: {}/{}", bucket, key)))
            }
            Err(e) => Err(InariError::BlobStorage(format!(
                "Failed to read object {}: {}",
                key, e
            ))),
        }
    }

    async fn write_object(
        &self,
        key: &str,
        bucket: &str,
        data: Vec<u8>,
        _is_private: bool,
    ) -> InariResult<()> {
        let path = self.get_object_path(key, bucket)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                InariError::BlobStorage(format!("Failed to create object directory: {}", e))
            })?;
        }

        // Write beside the target and rename so readers never see a torn object
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, data).await.map_err(|e| {
            InariError::BlobStorage(format!("Failed to write object {}: {}", key, e))
        })?;
        fs::rename(&tmp_path, &path).await.map_err(|e| {
            InariError::BlobStorage(format!("Failed to commit object {}: {}", key, e))
        })?;

        Ok(())
    }
}
