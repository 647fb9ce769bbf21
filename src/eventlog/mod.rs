/// Event log
///
/// The append-only log of domain events kept in the blob store, the reduction
/// of those events into the relational projection, and the replay procedure
/// that rebuilds the projection from the log.

pub mod appender;
pub mod clock;
pub mod events;
pub mod reducer;
pub mod replayer;

pub use appender::{EventLog, EventLogConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{
    Envelope, EventType, EventVersion, MediaDeletedData, MediaDeletedEvent, MediaUploadedEvent,
    PostCreatedEvent,
};
pub use reducer::{NotePolicy, ProjectionConfig, ReduceOutcome, RowOp};
pub use replayer::ReplayReport;

use crate::error::{InariError, InariResult};
use serde::Deserialize;
use uuid::Uuid;

/// Placeholder produced when a stored payload cannot be understood
#[derive(Debug, Clone, PartialEq)]
pub struct NullEvent {
    pub reason: String,
}

/// The closed set of events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PostCreated(PostCreatedEvent),
    MediaUploaded(MediaUploadedEvent),
    MediaDeleted(MediaDeletedEvent),
    /// Appending or reducing this is a no-op
    Null(NullEvent),
}

#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "eventType")]
    event_type: String,
}

impl Event {
    pub fn null(reason: impl Into<String>) -> Self {
        Event::Null(NullEvent {
            reason: reason.into(),
        })
    }

    /// Decode a stored payload, falling back to the null event
    pub fn decode(bytes: &[u8]) -> Event {
        Self::try_decode(bytes).unwrap_or_else(|e| Event::null(e.to_string()))
    }

    /// Decode a stored payload
    ///
    /// Only `eventType` is read first; the rest of the payload is decoded by
    /// the variant it names.
    pub fn try_decode(bytes: &[u8]) -> InariResult<Event> {
        let discriminator: Discriminator = serde_json::from_slice(bytes)
            .map_err(|e| InariError::Decode(format!("unreadable event envelope: {}", e)))?;

        let event_type = EventType::parse(&discriminator.event_type).ok_or_else(|| {
            InariError::Decode(format!("unknown event type {:?}", discriminator.event_type))
        })?;

        let decoded = match event_type {
            EventType::PostCreated => serde_json::from_slice(bytes).map(Event::PostCreated),
            EventType::MediaUploaded => serde_json::from_slice(bytes).map(Event::MediaUploaded),
            EventType::MediaDeleted => serde_json::from_slice(bytes).map(Event::MediaDeleted),
        };

        decoded.map_err(|e| InariError::Decode(format!("invalid {} event: {}", event_type, e)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Event::Null(_))
    }

    pub fn event_id(&self) -> Option<Uuid> {
        match self {
            Event::PostCreated(e) => Some(e.event_id),
            Event::MediaUploaded(e) => Some(e.event_id),
            Event::MediaDeleted(e) => Some(e.event_id),
            Event::Null(_) => None,
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Event::PostCreated(e) => Some(e.event_type),
            Event::MediaUploaded(e) => Some(e.event_type),
            Event::MediaDeleted(e) => Some(e.event_type),
            Event::Null(_) => None,
        }
    }

    pub fn event_version(&self) -> Option<&EventVersion> {
        match self {
            Event::PostCreated(e) => Some(&e.event_version),
            Event::MediaUploaded(e) => Some(&e.event_version),
            Event::MediaDeleted(e) => Some(&e.event_version),
            Event::Null(_) => None,
        }
    }

    /// Encode to the persisted JSON shape; the null event encodes to nothing
    pub fn serialize(&self) -> InariResult<Vec<u8>> {
        let bytes = match self {
            Event::PostCreated(e) => e.serialize()?,
            Event::MediaUploaded(e) => e.serialize()?,
            Event::MediaDeleted(e) => e.serialize()?,
            Event::Null(_) => Vec::new(),
        };
        Ok(bytes)
    }

    /// Blob key under `prefix`; the null event is never stored
    pub fn storage_key(&self, prefix: &str) -> Option<String> {
        match self {
            Event::PostCreated(e) => Some(e.storage_key(prefix)),
            Event::MediaUploaded(e) => Some(e.storage_key(prefix)),
            Event::MediaDeleted(e) => Some(e.storage_key(prefix)),
            Event::Null(_) => None,
        }
    }
}

impl From<PostCreatedEvent> for Event {
    fn from(event: PostCreatedEvent) -> Self {
        Event::PostCreated(event)
    }
}

impl From<MediaUploadedEvent> for Event {
    fn from(event: MediaUploadedEvent) -> Self {
        Event::MediaUploaded(event)
    }
}

impl From<MediaDeletedEvent> for Event {
    fn from(event: MediaDeletedEvent) -> Self {
        Event::MediaDeleted(event)
    }
}
