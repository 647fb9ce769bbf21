/// S3-compatible blob storage backend
use crate::blob_store::BlobBackend;
use crate::error::{InariError, InariResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use std::sync::Arc;
use tracing::{debug, error, info};

/// S3 blob storage backend
///
/// Supports AWS S3 and S3-compatible storage providers (MinIO, LocalStack, etc.)
#[derive(Clone)]
pub struct S3BlobBackend {
    client: Arc<Client>,
}

/// Configuration for S3 storage
#[derive(Debug, Clone)]
pub struct S3Config {
    /// AWS region (e.g., "eu-central-1")
    pub region: String,

    /// Custom endpoint for S3-compatible services
    /// Example: "http://localhost:9000"
    pub endpoint: Option<String>,

    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "eu-central-1".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

impl S3BlobBackend {
    /// Create a new S3 blob backend
    pub async fn new(config: S3Config) -> InariResult<Self> {
        info!("Initializing S3 blob storage (region: {})", config.region);

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "inari",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            // Path-style addressing is required by MinIO and LocalStack
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

/// The SDK does not expose a typed not-found for every operation
fn is_not_found(message: &str) -> bool {
    message.contains("NoSuchKey") || message.contains("NotFound")
}

#[async_trait]
impl BlobBackend for S3BlobBackend {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> InariResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                error!(bucket, prefix, "Failed to list S3 objects: {}", e);
                InariError::BlobStorage(format!("S3 list failed: {}", e))
            })?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(String::from)));
        }

        debug!(bucket, prefix, count = keys.len(), "Listed S3 objects");
        Ok(keys)
    }

    async fn read_object(&self, key: &str, bucket: &str) -> InariResult<Vec<u8>> {
        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(response) => {
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| {
                        error!(bucket, key, "Failed to read S3 object body: {}", e);
                        InariError::BlobStorage(format!("Failed to read S3 object: {}", e))
                    })?
                    .into_bytes()
                    .to_vec();
                Ok(data)
            }
            Err(e) => {
                let error_msg = format!("{:?}", e);
                if is_not_found(&error_msg) {
                    Err(InariError::NotFound(format!("Object not found: {}/{}", bucket, key)))
                } else {
                    error!(bucket, key, "Failed to download S3 object: {}", e);
                    Err(InariError::BlobStorage(format!("S3 download failed: {}", e)))
                }
            }
        }
    }

    async fn write_object(
        &self,
        key: &str,
        bucket: &str,
        data: Vec<u8>,
        is_private: bool,
    ) -> InariResult<()> {
        let acl = if is_private {
            ObjectCannedAcl::Private
        } else {
            ObjectCannedAcl::PublicRead
        };

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(acl)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!(bucket, key, "Failed to upload S3 object: {}", e);
                InariError::BlobStorage(format!("S3 upload failed: {}", e))
            })?;

        debug!(bucket, key, "Uploaded S3 object");
        Ok(())
    }
}
