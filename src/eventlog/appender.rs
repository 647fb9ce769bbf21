/// Durable append of events to the log
use crate::{
    blob_store::BlobBackend,
    error::InariResult,
    eventlog::{Event, ProjectionConfig, ReduceOutcome},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Event log configuration
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Bucket holding the event objects
    pub bucket: String,

    /// Key prefix of the log inside the bucket
    pub prefix: String,

    pub projection: ProjectionConfig,
}

impl EventLogConfig {
    /// Prefix with surrounding slashes and spaces removed
    pub fn trimmed_prefix(&self) -> &str {
        self.prefix.trim_matches(|c| c == '/' || c == ' ')
    }

    /// Listing prefix covering every event key and nothing else
    pub fn listing_prefix(&self) -> String {
        match self.trimmed_prefix() {
            "" => String::new(),
            prefix => format!("{}/", prefix),
        }
    }
}

/// The event log: blob store objects plus their relational projection
#[derive(Clone)]
pub struct EventLog {
    pub(super) backend: Arc<dyn BlobBackend>,
    pub(super) db: SqlitePool,
    pub(super) config: EventLogConfig,
}

impl EventLog {
    pub fn new(backend: Arc<dyn BlobBackend>, db: SqlitePool, config: EventLogConfig) -> Self {
        Self {
            backend,
            db,
            config,
        }
    }

    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    /// Persist an event and reduce it into the projection
    ///
    /// The payload is validated before anything is written. The blob write and
    /// the reduction share one transaction; if the reduction fails after the
    /// blob is durable, the projection lags the log until the next replay.
    pub async fn append(&self, event: &Event) -> InariResult<ReduceOutcome> {
        let key = match event.storage_key(&self.config.prefix) {
            Some(key) => key,
            None => {
                tracing::debug!("Ignoring append of null event");
                return Ok(ReduceOutcome::Ignored);
            }
        };
        let event_id = event.event_id().map(|id| id.to_string()).unwrap_or_default();
        let event_type = event.event_type().map(|t| t.as_str()).unwrap_or_default();

        let ops = event.project(&self.config.projection)?;
        let bytes = event.serialize()?;

        let mut tx = self.db.begin().await?;

        if let Err(e) = self
            .backend
            .write_object(&key, &self.config.bucket, bytes, true)
            .await
        {
            tracing::error!(key = %key, event_id = %event_id, event_type, "Failed to write event: {}", e);
            return Err(e);
        }

        let outcome = match super::reducer::apply(&ops, &mut tx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    key = %key,
                    event_id = %event_id,
                    event_type,
                    "Event stored but not reduced; replay will pick it up: {}",
                    e
                );
                return Err(e);
            }
        };

        tx.commit().await?;

        tracing::info!(key = %key, event_id = %event_id, event_type, "Appended event");
        Ok(outcome)
    }
}
