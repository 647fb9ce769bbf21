/// Media metadata models
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Metadata recorded for one uploaded media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub uid: String,
    /// Public url; recomputed from `file_key` during projection
    #[serde(default)]
    pub url: String,
    pub file_key: String,
    pub file_hash: String,
    pub mime_type: String,
    /// Capture time, when the file carried one
    #[serde(default)]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl MediaMetadata {
    /// Public url of `file_key` under the media base url
    pub fn public_url(base_url: &str, file_key: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            file_key.trim_start_matches('/')
        )
    }

    /// Copy of this record with `url` derived from `base_url`
    pub fn with_base_url(&self, base_url: &str) -> Self {
        Self {
            url: Self::public_url(base_url, &self.file_key),
            ..self.clone()
        }
    }
}
