/// Rebuilding the projection from the log
use crate::{
    error::InariResult,
    eventlog::{Event, EventLog, ReduceOutcome},
};
use std::collections::HashSet;

/// Projection tables cleared before a rebuild
const PROJECTION_TABLES: &[&str] = &["events", "posts", "media", "media_published", "media_deleted"];

/// Summary of one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Keys returned by the listings
    pub listed: usize,
    pub applied: usize,
    /// Events whose id had already been reduced earlier in the run
    pub duplicates: usize,
    /// Unreadable, undecodable or invalid events
    pub skipped: usize,
}

impl EventLog {
    /// Rebuild the projection from every event in the log
    ///
    /// Events are listed, read and decoded before the transaction opens. The
    /// transaction then clears the projection, which takes the write lock, and
    /// lists the log a second time to pick up events appended while fetching.
    /// Appends arriving after that queue behind the lock and reduce on top of
    /// the rebuilt tables. Readers see either the old projection or the
    /// complete new one.
    ///
    /// Listing and database errors abort the replay. Objects that cannot be
    /// read or decoded, and events that fail validation, are logged and
    /// skipped.
    pub async fn replay(&self) -> InariResult<ReplayReport> {
        let bucket = &self.config.bucket;
        let prefix = self.config.listing_prefix();

        let keys = self.backend.list_keys(bucket, &prefix).await?;
        tracing::info!(bucket = %bucket, keys = keys.len(), "Replaying event log");

        let mut report = ReplayReport::default();
        let mut events = Vec::with_capacity(keys.len());
        self.fetch(&keys, &mut events, &mut report).await;

        let mut tx = self.db.begin().await?;

        for table in PROJECTION_TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }

        let seen: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let late: Vec<String> = self
            .backend
            .list_keys(bucket, &prefix)
            .await?
            .into_iter()
            .filter(|key| !seen.contains(key.as_str()))
            .collect();
        if !late.is_empty() {
            tracing::debug!(keys = late.len(), "Events appended during replay");
            self.fetch(&late, &mut events, &mut report).await;
        }
        report.listed = keys.len() + late.len();

        for (key, event) in &events {
            let event_id = event.event_id().map(|id| id.to_string()).unwrap_or_default();
            let event_type = event.event_type().map(|t| t.as_str()).unwrap_or_default();

            match event.reduce(&mut tx, &self.config.projection).await {
                Ok(ReduceOutcome::Applied) => report.applied += 1,
                Ok(ReduceOutcome::Duplicate) => {
                    tracing::debug!(key = %key, event_id = %event_id, "Duplicate event id");
                    report.duplicates += 1;
                }
                Ok(ReduceOutcome::Ignored) => report.skipped += 1,
                Err(e) if e.is_skippable() => {
                    tracing::warn!(
                        key = %key,
                        event_id = %event_id,
                        event_type,
                        "Skipping invalid event: {}",
                        e
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(key = %key, event_id = %event_id, event_type, "Replay aborted: {}", e);
                    return Err(e);
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            listed = report.listed,
            applied = report.applied,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Replay complete"
        );
        Ok(report)
    }

    /// Read and decode `keys`, counting unusable objects as skipped
    async fn fetch(&self, keys: &[String], events: &mut Vec<(String, Event)>, report: &mut ReplayReport) {
        for key in keys {
            let bytes = match self.backend.read_object(key, &self.config.bucket).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(key = %key, "Skipping unreadable event: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            match Event::decode(&bytes) {
                Event::Null(null) => {
                    tracing::warn!(key = %key, reason = %null.reason, "Skipping undecodable event");
                    report.skipped += 1;
                }
                event => events.push((key.clone(), event)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob_store::{BlobBackend, MemoryBlobBackend},
        db,
        error::{InariError, InariResult},
        eventlog::{EventLogConfig, ManualClock, MediaUploadedEvent, NotePolicy, PostCreatedEvent, ProjectionConfig},
        models::{MediaMetadata, Post},
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    const BUCKET: &str = "events-bucket";

    async fn event_log(backend: Arc<dyn BlobBackend>) -> EventLog {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        EventLog::new(
            backend,
            pool,
            EventLogConfig {
                bucket: BUCKET.to_string(),
                prefix: "events".to_string(),
                projection: ProjectionConfig {
                    media_base_url: "https://media.example".to_string(),
                    note_policy: NotePolicy::Include,
                },
            },
        )
    }

    fn post(uid: &str, published: &str) -> Post {
        Post::new("h-entry")
            .with_property("uid", uid)
            .with_property("url", format!("https://site.example/p/{}", uid))
            .with_property("published", published)
            .with_property("author", "https://site.example")
    }

    async fn store(backend: &MemoryBlobBackend, event: &Event) {
        backend
            .write_object(
                &event.storage_key("events").unwrap(),
                BUCKET,
                event.serialize().unwrap(),
                true,
            )
            .await
            .unwrap();
    }

    async fn count(log: &EventLog, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(log.db())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_replay_rebuilds_and_skips_bad_events() {
        let backend = MemoryBlobBackend::new();
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2019, 1, 28, 13, 13, 13).unwrap());

        store(&backend, &PostCreatedEvent::new(post("good", "2019-01-28T13:13:13Z"), &clock).into()).await;
        store(&backend, &PostCreatedEvent::new(post("bad", "not a date"), &clock).into()).await;
        backend
            .write_object("events/2019/garbage.json", BUCKET, b"{oops".to_vec(), true)
            .await
            .unwrap();
        // Outside the log prefix
        backend
            .write_object("other/2019/x.json", BUCKET, b"{}".to_vec(), true)
            .await
            .unwrap();

        let log = event_log(Arc::new(backend)).await;
        let report = log.replay().await.unwrap();

        assert_eq!(
            report,
            ReplayReport {
                listed: 3,
                applied: 1,
                duplicates: 0,
                skipped: 2,
            }
        );
        assert_eq!(count(&log, "posts").await, 1);
    }

    #[tokio::test]
    async fn test_replay_replaces_previous_projection() {
        let backend = MemoryBlobBackend::new();
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2019, 1, 28, 13, 13, 13).unwrap());
        let log = event_log(Arc::new(backend.clone())).await;

        let kept: Event = PostCreatedEvent::new(post("kept", "2019-01-28T13:13:13Z"), &clock).into();
        let dropped: Event = MediaUploadedEvent::new(
            MediaMetadata {
                uid: "m1".to_string(),
                url: String::new(),
                file_key: "2019/a.jpg".to_string(),
                file_hash: "a".to_string(),
                mime_type: "image/jpeg".to_string(),
                date_time: None,
                lat: None,
                lng: None,
            },
            &clock,
        )
        .into();
        log.append(&kept).await.unwrap();
        log.append(&dropped).await.unwrap();

        // Truncate the log behind the projection's back
        backend.remove(&dropped.storage_key("events").unwrap(), BUCKET).await;

        let report = log.replay().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(count(&log, "posts").await, 1);
        assert_eq!(count(&log, "media").await, 0);
        assert_eq!(count(&log, "events").await, 1);
    }

    /// Lists one readable and one unreadable key, or fails to list at all
    struct FlakyBackend {
        inner: MemoryBlobBackend,
        listing_fails: bool,
    }

    #[async_trait]
    impl BlobBackend for FlakyBackend {
        async fn list_keys(&self, bucket: &str, prefix: &str) -> InariResult<Vec<String>> {
            if self.listing_fails {
                return Err(InariError::BlobStorage("listing timed out".to_string()));
            }
            let mut keys = self.inner.list_keys(bucket, prefix).await?;
            keys.push("events/2019/vanished.json".to_string());
            Ok(keys)
        }

        async fn read_object(&self, key: &str, bucket: &str) -> InariResult<Vec<u8>> {
            self.inner.read_object(key, bucket).await
        }

        async fn write_object(&self, key: &str, bucket: &str, data: Vec<u8>, is_private: bool) -> InariResult<()> {
            self.inner.write_object(key, bucket, data, is_private).await
        }
    }

    async fn seed_old_projection(log: &EventLog) {
        sqlx::query("INSERT INTO media_published (id) VALUES ('https://media.example/old.jpg')")
            .execute(log.db())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_event_is_skipped() {
        let inner = MemoryBlobBackend::new();
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2019, 1, 28, 13, 13, 13).unwrap());
        store(&inner, &PostCreatedEvent::new(post("good", "2019-01-28T13:13:13Z"), &clock).into()).await;
        let log = event_log(Arc::new(FlakyBackend {
            inner,
            listing_fails: false,
        }))
        .await;
        seed_old_projection(&log).await;

        let report = log.replay().await.unwrap();

        assert_eq!((report.listed, report.applied, report.skipped), (2, 1, 1));
        assert_eq!(count(&log, "posts").await, 1);
        assert_eq!(count(&log, "media_published").await, 0);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_and_keeps_old_projection() {
        let log = event_log(Arc::new(FlakyBackend {
            inner: MemoryBlobBackend::new(),
            listing_fails: true,
        }))
        .await;
        seed_old_projection(&log).await;

        let err = log.replay().await.unwrap_err();
        assert!(matches!(err, InariError::BlobStorage(_)));
        assert_eq!(count(&log, "media_published").await, 1);
    }

    #[tokio::test]
    async fn test_tolerant_post_payloads_are_reduced() {
        let backend = MemoryBlobBackend::new();
        let payload = br#"{"eventID":"5b1f0d2e-8f43-4c3a-9d36-0c1b3a6f4c11","eventType":"PostCreated","eventVersion":"20190128131313.0000","eventData":{"type":["h-entry"],"id":"legacy","properties":{"uid":["legacy"],"url":["https://site.example/p/legacy"],"published":["2019-01-28T13:13:13Z"],"draft":[false]}}}"#;
        backend
            .write_object("events/2019/legacy.json", BUCKET, payload.to_vec(), true)
            .await
            .unwrap();

        let log = event_log(Arc::new(backend)).await;
        let report = log.replay().await.unwrap();

        assert_eq!((report.applied, report.skipped), (1, 0));
        assert_eq!(count(&log, "posts").await, 1);
    }
}
