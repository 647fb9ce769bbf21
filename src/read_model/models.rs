/// Read model types
use crate::models::MediaMetadata;
use serde::Serialize;
use sqlx::FromRow;

/// One page of a newest-first listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Sort key to pass as `after` for the next page, when more remain
    pub after: Option<String>,
}

/// Media record with its publication state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaItem {
    #[serde(flatten)]
    pub metadata: MediaMetadata,
    /// Referenced by at least one post's `photo` property
    pub is_published: bool,
}

/// Media archive bucket (a year, month or day)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct MediaArchiveCount {
    pub period: String,
    pub count: i64,
    pub published_count: i64,
}

/// Post archive bucket (a year or month)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct PostArchiveCount {
    pub period: String,
    pub count: i64,
}

#[derive(Debug, FromRow)]
pub(super) struct PostRow {
    pub data: String,
    pub sort_key: String,
}

#[derive(Debug, FromRow)]
pub(super) struct MediaRow {
    pub data: String,
    pub sort_key: String,
    pub is_published: bool,
}
