/// Publishing use cases
///
/// Turns drafts and uploads into events and appends them to the log.
use crate::{
    blob_store::BlobBackend,
    error::{InariError, InariResult},
    eventlog::{Clock, Event, EventLog, MediaDeletedEvent, MediaUploadedEvent, PostCreatedEvent},
    models::{MediaMetadata, Post},
};
use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};
use std::{path::Path, sync::Arc};
use uuid::Uuid;

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Public site url; post urls are `<site_url>/p/<uid>`
    pub site_url: String,

    /// Default `author` for posts that do not name one
    pub author: String,

    /// Bucket receiving uploaded media files
    pub media_bucket: String,
}

/// A media file to publish
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Capture time, when known
    pub date_time: Option<DateTime<FixedOffset>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Clone)]
pub struct Publisher {
    event_log: EventLog,
    media: Arc<dyn BlobBackend>,
    clock: Arc<dyn Clock>,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(
        event_log: EventLog,
        media: Arc<dyn BlobBackend>,
        clock: Arc<dyn Clock>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            event_log,
            media,
            clock,
            config,
        }
    }

    /// Publish a new post, returning it with its defaults filled in
    pub async fn create_post(&self, mut draft: Post) -> InariResult<Post> {
        let uid = draft
            .uid()
            .filter(|uid| !uid.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let url = format!("{}/p/{}", self.config.site_url.trim_end_matches('/'), uid);

        draft.set_defaults(&self.config.author, &uid, &url, self.clock.now());

        let event: Event = PostCreatedEvent::new(draft.clone(), self.clock.as_ref()).into();
        self.event_log.append(&event).await?;

        tracing::info!(url = %url, "Published post");
        Ok(draft)
    }

    /// Store a media file and record its upload
    ///
    /// The file lands at `<year>/<sha256>.<ext>` in the media bucket, where
    /// the year comes from the capture time or, failing that, from now.
    pub async fn upload_media(&self, upload: MediaUpload) -> InariResult<MediaMetadata> {
        if upload.bytes.is_empty() {
            return Err(InariError::Validation(format!("{} is empty", upload.file_name)));
        }
        if upload.mime_type.trim().is_empty() {
            return Err(InariError::Validation(format!("{} has no mime type", upload.file_name)));
        }

        let file_hash = hex::encode(Sha256::digest(&upload.bytes));
        let extension = Path::new(&upload.file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let year = match &upload.date_time {
            Some(at) => at.format("%Y").to_string(),
            None => self.clock.now().format("%Y").to_string(),
        };
        let file_key = format!("{}/{}{}", year, file_hash, extension);

        self.media
            .write_object(&file_key, &self.config.media_bucket, upload.bytes, false)
            .await?;

        let metadata = MediaMetadata {
            uid: Uuid::new_v4().to_string(),
            url: MediaMetadata::public_url(
                &self.event_log.config().projection.media_base_url,
                &file_key,
            ),
            file_key,
            file_hash,
            mime_type: upload.mime_type,
            date_time: upload.date_time,
            lat: upload.lat,
            lng: upload.lng,
        };

        let event: Event = MediaUploadedEvent::new(metadata.clone(), self.clock.as_ref()).into();
        self.event_log.append(&event).await?;

        tracing::info!(url = %metadata.url, file_key = %metadata.file_key, "Uploaded media");
        Ok(metadata)
    }

    /// Remove a media item from the projection; the file itself is kept
    pub async fn delete_media(&self, url: &str) -> InariResult<()> {
        if url.trim().is_empty() {
            return Err(InariError::Validation("media url must not be empty".to_string()));
        }

        let event: Event = MediaDeletedEvent::new(url, self.clock.as_ref()).into();
        self.event_log.append(&event).await?;

        tracing::info!(url = %url, "Deleted media");
        Ok(())
    }
}
