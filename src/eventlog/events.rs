/// Event envelope and variant payload definitions
use crate::{
    eventlog::clock::Clock,
    models::{MediaMetadata, Post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Event type discriminator, stored as `eventType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    PostCreated,
    MediaUploaded,
    MediaDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PostCreated => "PostCreated",
            EventType::MediaUploaded => "MediaUploaded",
            EventType::MediaDeleted => "MediaDeleted",
        }
    }

    /// Recognise a discriminator; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "PostCreated" => Some(EventType::PostCreated),
            "MediaUploaded" => Some(EventType::MediaUploaded),
            "MediaDeleted" => Some(EventType::MediaDeleted),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sortable creation stamp, `YYYYMMDDHHMMSS.ffff` in UTC
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventVersion(String);

impl EventVersion {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        // Leap seconds report up to 1_999_999_999 nanos
        let fraction = (at.timestamp_subsec_nanos() / 100_000).min(9_999);
        Self(format!("{}.{:04}", at.format("%Y%m%d%H%M%S"), fraction))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Calendar year the event was created in
    pub fn year(&self) -> &str {
        self.0
            .get(..4)
            .filter(|year| year.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or("0000")
    }
}

impl fmt::Display for EventVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Common envelope shared by every persisted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "eventID")]
    pub event_id: Uuid,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(rename = "eventVersion")]
    pub event_version: EventVersion,
    #[serde(rename = "eventData")]
    pub event_data: T,
}

impl<T: Serialize> Envelope<T> {
    fn stamp(event_type: EventType, event_data: T, clock: &dyn Clock) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            event_version: EventVersion::from_datetime(clock.now()),
            event_data,
        }
    }

    /// Encode to the persisted JSON shape
    pub fn serialize(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Blob key: `<prefix>/<year>/<event_version>_<event_id>.json`
    pub fn storage_key(&self, prefix: &str) -> String {
        let prefix = prefix.trim_matches(|c| c == '/' || c == ' ');
        let file = format!(
            "{}/{}_{}.json",
            self.event_version.year(),
            self.event_version,
            self.event_id
        );
        if prefix.is_empty() {
            file
        } else {
            format!("{}/{}", prefix, file)
        }
    }
}

/// Payload of a `MediaDeleted` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeletedData {
    pub url: String,
}

pub type PostCreatedEvent = Envelope<Post>;
pub type MediaUploadedEvent = Envelope<MediaMetadata>;
pub type MediaDeletedEvent = Envelope<MediaDeletedData>;

impl PostCreatedEvent {
    /// The post must already carry `uid`, `url`, `published` and `author`
    pub fn new(post: Post, clock: &dyn Clock) -> Self {
        Self::stamp(EventType::PostCreated, post, clock)
    }
}

impl MediaUploadedEvent {
    pub fn new(metadata: MediaMetadata, clock: &dyn Clock) -> Self {
        Self::stamp(EventType::MediaUploaded, metadata, clock)
    }
}

impl MediaDeletedEvent {
    pub fn new(url: impl Into<String>, clock: &dyn Clock) -> Self {
        Self::stamp(EventType::MediaDeleted, MediaDeletedData { url: url.into() }, clock)
    }
}
