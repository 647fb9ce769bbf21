/// Reduction of events into the relational projection
///
/// Reducing an event happens in two steps. [`Event::project`] is pure: it
/// validates the payload and describes the row changes as [`RowOp`]s.
/// [`apply`] then executes those operations on an open transaction. Every
/// content problem surfaces as an error from the first step, before any SQL
/// runs, so a rejected event never leaves a half-applied transaction behind.
use crate::{
    error::{InariError, InariResult},
    eventlog::{Event, EventType, EventVersion},
    models::MediaMetadata,
};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use sqlx::{Sqlite, Transaction};
use std::{fmt, str::FromStr};

/// Sort key prefix for media without a capture time
const UNDATED_SORT_PREFIX: &str = "0000-00-00T00:00:00Z";

/// Which `PostCreated` events reach the `posts` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotePolicy {
    /// Project every post, including text-only notes
    #[default]
    Include,
    /// Project only posts carrying a `photo` property
    PhotosOnly,
}

impl NotePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotePolicy::Include => "include",
            NotePolicy::PhotosOnly => "photos-only",
        }
    }
}

impl FromStr for NotePolicy {
    type Err = InariError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(NotePolicy::Include),
            "photos-only" | "photos_only" => Ok(NotePolicy::PhotosOnly),
            other => Err(InariError::Config(format!(
                "unknown note policy {:?} (expected include or photos-only)",
                other
            ))),
        }
    }
}

impl fmt::Display for NotePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings that shape the projection
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Public base url media file keys are resolved against
    pub media_base_url: String,
    pub note_policy: NotePolicy,
}

/// One row change produced by reducing an event
#[derive(Debug, Clone, PartialEq)]
pub enum RowOp {
    /// Claim the event id; the remaining operations run only if it was new
    RecordEvent {
        id: String,
        version: String,
        event_type: EventType,
        data: String,
    },
    UpsertPost {
        id: String,
        year: String,
        month: String,
        sort_key: String,
        version: String,
        data: String,
    },
    PublishMedia {
        id: String,
    },
    UpsertMedia {
        id: String,
        year: String,
        month: String,
        day: String,
        sort_key: String,
        version: String,
        data: String,
    },
    DeleteMedia {
        id: String,
        version: String,
    },
}

/// What reducing one event did to the projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOutcome {
    Applied,
    /// The event id was already reduced
    Duplicate,
    /// Null event
    Ignored,
}

/// `"2019-01-28T13:13:13Z" + uid`
fn sort_key_for(at: &DateTime<FixedOffset>, uid: &str) -> String {
    format!(
        "{}{}",
        at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true),
        uid
    )
}

/// Version written to projected rows
///
/// The event id breaks ties between events stamped with the same version, so
/// every pair of events is strictly ordered.
fn row_version(version: &EventVersion, event_id: &uuid::Uuid) -> String {
    format!("{}_{}", version, event_id)
}

fn require<'a>(value: Option<&'a str>, what: &str, event: &str) -> InariResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(InariError::Validation(format!("{} event has no {}", event, what))),
    }
}

impl Event {
    /// Describe the row changes this event makes, without touching a store
    pub fn project(&self, config: &ProjectionConfig) -> InariResult<Vec<RowOp>> {
        let record = |id: uuid::Uuid, version: &str, event_type: EventType, data: String| RowOp::RecordEvent {
            id: id.to_string(),
            version: version.to_string(),
            event_type,
            data,
        };

        match self {
            Event::Null(_) => Ok(Vec::new()),

            Event::PostCreated(event) => {
                let post = &event.event_data;
                let url = require(post.url(), "url", "PostCreated")?;
                let uid = require(post.uid(), "uid", "PostCreated")?;
                let published = post.published()?;
                let version = event.event_version.as_str();
                let row_version = row_version(&event.event_version, &event.event_id);

                let mut ops = vec![record(
                    event.event_id,
                    version,
                    event.event_type,
                    serde_json::to_string(event)?,
                )];

                let photos = post.strings("photo");
                if config.note_policy == NotePolicy::PhotosOnly && photos.is_empty() {
                    return Ok(ops);
                }

                ops.push(RowOp::UpsertPost {
                    id: url.to_string(),
                    year: published.format("%Y").to_string(),
                    month: published.format("%m").to_string(),
                    sort_key: sort_key_for(&published, uid),
                    version: row_version,
                    data: serde_json::to_string(post)?,
                });
                ops.extend(photos.into_iter().map(|photo| RowOp::PublishMedia {
                    id: photo.to_string(),
                }));

                Ok(ops)
            }

            Event::MediaUploaded(event) => {
                let meta: MediaMetadata = event.event_data.with_base_url(&config.media_base_url);
                let uid = require(Some(meta.uid.as_str()), "uid", "MediaUploaded")?;
                require(Some(meta.file_key.as_str()), "file_key", "MediaUploaded")?;
                let version = event.event_version.as_str();
                let row_version = row_version(&event.event_version, &event.event_id);

                let (year, month, day, sort_key) = match &meta.date_time {
                    Some(at) => (
                        at.format("%Y").to_string(),
                        at.format("%m").to_string(),
                        at.format("%d").to_string(),
                        sort_key_for(at, uid),
                    ),
                    None => (
                        "0000".to_string(),
                        "00".to_string(),
                        "00".to_string(),
                        format!("{}{}", UNDATED_SORT_PREFIX, uid),
                    ),
                };

                Ok(vec![
                    record(
                        event.event_id,
                        version,
                        event.event_type,
                        serde_json::to_string(event)?,
                    ),
                    RowOp::UpsertMedia {
                        id: meta.url.clone(),
                        year,
                        month,
                        day,
                        sort_key,
                        version: row_version,
                        data: serde_json::to_string(&meta)?,
                    },
                ])
            }

            Event::MediaDeleted(event) => {
                let url = require(Some(event.event_data.url.as_str()), "url", "MediaDeleted")?;
                let version = event.event_version.as_str();
                let row_version = row_version(&event.event_version, &event.event_id);

                Ok(vec![
                    record(
                        event.event_id,
                        version,
                        event.event_type,
                        serde_json::to_string(event)?,
                    ),
                    RowOp::DeleteMedia {
                        id: url.to_string(),
                        version: row_version,
                    },
                ])
            }
        }
    }

    /// Project this event and apply the result inside `tx`
    pub async fn reduce(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        config: &ProjectionConfig,
    ) -> InariResult<ReduceOutcome> {
        if self.is_null() {
            return Ok(ReduceOutcome::Ignored);
        }

        let ops = self.project(config)?;
        apply(&ops, tx).await
    }
}

/// Execute row operations in order
///
/// A `RecordEvent` whose id is already present stops the run and reports
/// [`ReduceOutcome::Duplicate`].
pub async fn apply(ops: &[RowOp], tx: &mut Transaction<'_, Sqlite>) -> InariResult<ReduceOutcome> {
    for op in ops {
        match op {
            RowOp::RecordEvent {
                id,
                version,
                event_type,
                data,
            } => {
                let result = sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO events (id, version, event_type, data)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                )
                .bind(id)
                .bind(version)
                .bind(event_type.as_str())
                .bind(data)
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    tracing::debug!(event_id = %id, "Event already reduced");
                    return Ok(ReduceOutcome::Duplicate);
                }
            }

            RowOp::UpsertPost {
                id,
                year,
                month,
                sort_key,
                version,
                data,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO posts (id, year, month, sort_key, version, data)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        year = excluded.year,
                        month = excluded.month,
                        sort_key = excluded.sort_key,
                        version = excluded.version,
                        data = excluded.data
                    WHERE excluded.version > posts.version
                    "#,
                )
                .bind(id)
                .bind(year)
                .bind(month)
                .bind(sort_key)
                .bind(version)
                .bind(data)
                .execute(&mut **tx)
                .await?;
            }

            RowOp::PublishMedia { id } => {
                sqlx::query("INSERT OR IGNORE INTO media_published (id) VALUES (?1)")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
            }

            RowOp::UpsertMedia {
                id,
                year,
                month,
                day,
                sort_key,
                version,
                data,
            } => {
                // Skipped when a deletion at least as new has been seen
                sqlx::query(
                    r#"
                    INSERT INTO media (id, year, month, day, sort_key, version, data)
                    SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                    WHERE NOT EXISTS (
                        SELECT 1 FROM media_deleted WHERE id = ?1 AND version >= ?6
                    )
                    ON CONFLICT(id) DO UPDATE SET
                        year = excluded.year,
                        month = excluded.month,
                        day = excluded.day,
                        sort_key = excluded.sort_key,
                        version = excluded.version,
                        data = excluded.data
                    WHERE excluded.version > media.version
                    "#,
                )
                .bind(id)
                .bind(year)
                .bind(month)
                .bind(day)
                .bind(sort_key)
                .bind(version)
                .bind(data)
                .execute(&mut **tx)
                .await?;
            }

            RowOp::DeleteMedia { id, version } => {
                sqlx::query(
                    r#"
                    INSERT INTO media_deleted (id, version)
                    VALUES (?1, ?2)
                    ON CONFLICT(id) DO UPDATE SET version = excluded.version
                    WHERE excluded.version > media_deleted.version
                    "#,
                )
                .bind(id)
                .bind(version)
                .execute(&mut **tx)
                .await?;

                sqlx::query("DELETE FROM media WHERE id = ?1 AND version <= ?2")
                    .bind(id)
                    .bind(version)
                    .execute(&mut **tx)
                    .await?;
            }
        }
    }

    Ok(ReduceOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        eventlog::{ManualClock, MediaDeletedEvent, MediaUploadedEvent, PostCreatedEvent},
        models::Post,
    };
    use chrono::TimeZone;
    use sqlx::SqlitePool;

    fn config(note_policy: NotePolicy) -> ProjectionConfig {
        ProjectionConfig {
            media_base_url: "https://media.example/".to_string(),
            note_policy,
        }
    }

    fn clock() -> ManualClock {
        ManualClock::starting_at(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
    }

    fn post(uid: &str, published: &str) -> Post {
        Post::new("h-entry")
            .with_property("uid", uid)
            .with_property("url", format!("https://site.example/p/{}", uid))
            .with_property("published", published)
            .with_property("author", "https://site.example")
    }

    fn media(uid: &str, file_key: &str, date_time: Option<&str>) -> MediaMetadata {
        MediaMetadata {
            uid: uid.to_string(),
            url: String::new(),
            file_key: file_key.to_string(),
            file_hash: "abc".to_string(),
            mime_type: "image/jpeg".to_string(),
            date_time: date_time.map(|s| DateTime::parse_from_rfc3339(s).unwrap()),
            lat: None,
            lng: None,
        }
    }

    async fn pool() -> SqlitePool {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn reduce_all(pool: &SqlitePool, events: &[Event]) -> Vec<ReduceOutcome> {
        let cfg = config(NotePolicy::Include);
        let mut tx = pool.begin().await.unwrap();
        let mut outcomes = Vec::new();
        for event in events {
            outcomes.push(event.reduce(&mut tx, &cfg).await.unwrap());
        }
        tx.commit().await.unwrap();
        outcomes
    }

    #[test]
    fn test_post_projection_rows() {
        let event: Event = PostCreatedEvent::new(
            post("test123", "2019-01-28T13:13:13Z").with_property("photo", "https://media.example/2019/a.jpg"),
            &clock(),
        )
        .into();

        let ops = event.project(&config(NotePolicy::Include)).unwrap();
        assert!(matches!(ops[0], RowOp::RecordEvent { event_type: EventType::PostCreated, .. }));
        match &ops[1] {
            RowOp::UpsertPost {
                id, year, month, sort_key, ..
            } => {
                assert_eq!(id, "https://site.example/p/test123");
                assert_eq!(year, "2019");
                assert_eq!(month, "01");
                assert_eq!(sort_key, "2019-01-28T13:13:13Ztest123");
            }
            other => panic!("expected post upsert, got {:?}", other),
        }
        assert_eq!(
            ops[2],
            RowOp::PublishMedia {
                id: "https://media.example/2019/a.jpg".to_string()
            }
        );
    }

    #[test]
    fn test_sort_key_is_utc_but_archive_follows_author_offset() {
        let event: Event = PostCreatedEvent::new(post("late", "2019-02-01T00:30:00+01:00"), &clock()).into();

        let ops = event.project(&config(NotePolicy::Include)).unwrap();
        match &ops[1] {
            RowOp::UpsertPost {
                year, month, sort_key, ..
            } => {
                assert_eq!((year.as_str(), month.as_str()), ("2019", "02"));
                assert_eq!(sort_key, "2019-01-31T23:30:00Zlate");
            }
            other => panic!("expected post upsert, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_published_is_validation_error() {
        let event: Event = PostCreatedEvent::new(post("bad", "yesterday"), &clock()).into();

        let err = event.project(&config(NotePolicy::Include)).unwrap_err();
        assert!(matches!(err, InariError::Validation(_)));
    }

    #[test]
    fn test_photos_only_policy_skips_notes() {
        let event: Event = PostCreatedEvent::new(post("note", "2019-01-28T13:13:13Z"), &clock()).into();

        let ops = event.project(&config(NotePolicy::PhotosOnly)).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], RowOp::RecordEvent { .. }));
    }

    #[test]
    fn test_undated_media_sorts_last() {
        let event: Event = MediaUploadedEvent::new(media("m1", "2019/abc.jpg", None), &clock()).into();

        let ops = event.project(&config(NotePolicy::Include)).unwrap();
        match &ops[1] {
            RowOp::UpsertMedia {
                id,
                year,
                month,
                day,
                sort_key,
                data,
                ..
            } => {
                assert_eq!(id, "https://media.example/2019/abc.jpg");
                assert_eq!((year.as_str(), month.as_str(), day.as_str()), ("0000", "00", "00"));
                assert_eq!(sort_key, "0000-00-00T00:00:00Zm1");
                assert!(data.contains("https://media.example/2019/abc.jpg"));
            }
            other => panic!("expected media upsert, got {:?}", other),
        }
    }

    #[test]
    fn test_note_policy_parse() {
        assert_eq!("include".parse::<NotePolicy>().unwrap(), NotePolicy::Include);
        assert_eq!(" Photos-Only ".parse::<NotePolicy>().unwrap(), NotePolicy::PhotosOnly);
        assert!(matches!("everything".parse::<NotePolicy>(), Err(InariError::Config(_))));
    }

    #[tokio::test]
    async fn test_reducing_twice_is_a_noop() {
        let pool = pool().await;
        let event: Event = PostCreatedEvent::new(
            post("test123", "2019-01-28T13:13:13Z").with_property("photo", "https://media.example/2019/a.jpg"),
            &clock(),
        )
        .into();

        let outcomes = reduce_all(&pool, &[event.clone(), event]).await;
        assert_eq!(outcomes, vec![ReduceOutcome::Applied, ReduceOutcome::Duplicate]);

        let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts").fetch_one(&pool).await.unwrap();
        let published: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_published")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((posts, published), (1, 1));
    }

    #[tokio::test]
    async fn test_null_event_is_ignored() {
        let pool = pool().await;
        let outcomes = reduce_all(&pool, &[Event::null("garbage")]).await;
        assert_eq!(outcomes, vec![ReduceOutcome::Ignored]);

        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events").fetch_one(&pool).await.unwrap();
        assert_eq!(events, 0);
    }

    #[tokio::test]
    async fn test_deletion_wins_regardless_of_order() {
        let clock = clock();
        let upload: Event = MediaUploadedEvent::new(
            media("m1", "2019/abc.jpg", Some("2019-01-28T13:13:13Z")),
            &clock,
        )
        .into();
        let delete: Event = MediaDeletedEvent::new("https://media.example/2019/abc.jpg", &clock).into();

        for order in [[upload.clone(), delete.clone()], [delete.clone(), upload.clone()]] {
            let pool = pool().await;
            reduce_all(&pool, &order).await;

            let media: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media").fetch_one(&pool).await.unwrap();
            assert_eq!(media, 0);
        }
    }

    #[tokio::test]
    async fn test_reupload_after_deletion_is_projected() {
        let clock = clock();
        let meta = media("m1", "2019/abc.jpg", Some("2019-01-28T13:13:13Z"));
        let upload: Event = MediaUploadedEvent::new(meta.clone(), &clock).into();
        let delete: Event = MediaDeletedEvent::new("https://media.example/2019/abc.jpg", &clock).into();
        let reupload: Event = MediaUploadedEvent::new(meta, &clock).into();

        let pool = pool().await;
        reduce_all(&pool, &[reupload, delete, upload]).await;

        let version: String = sqlx::query_scalar("SELECT version FROM media WHERE id = ?1")
            .bind("https://media.example/2019/abc.jpg")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(version.starts_with("20200101000002.0000_"), "{}", version);
    }

    #[tokio::test]
    async fn test_same_version_uploads_resolve_by_event_id() {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            chrono::Duration::zero(),
        );
        let mut first = media("m1", "2019/abc.jpg", None);
        first.file_hash = "first".to_string();
        let mut second = first.clone();
        second.file_hash = "second".to_string();
        let a: Event = MediaUploadedEvent::new(first, &clock).into();
        let b: Event = MediaUploadedEvent::new(second, &clock).into();
        assert_eq!(a.event_version(), b.event_version());

        let mut results = Vec::new();
        for order in [[a.clone(), b.clone()], [b.clone(), a.clone()]] {
            let pool = pool().await;
            reduce_all(&pool, &order).await;
            let data: String = sqlx::query_scalar("SELECT data FROM media WHERE id = ?1")
                .bind("https://media.example/2019/abc.jpg")
                .fetch_one(&pool)
                .await
                .unwrap();
            results.push(data);
        }
        assert_eq!(results[0], results[1]);

        let winner = if a.event_id() > b.event_id() { "first" } else { "second" };
        assert!(results[0].contains(winner));
    }
}
