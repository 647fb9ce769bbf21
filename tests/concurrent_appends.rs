/// Concurrent appends against a file-backed projection
use futures::future::join_all;
use inari::{
    blob_store::{BlobBackend, DiskBlobBackend},
    db::{self, DatabaseOptions},
    eventlog::{
        Event, EventLog, EventLogConfig, NotePolicy, PostCreatedEvent, ProjectionConfig, ReduceOutcome,
        SystemClock,
    },
    models::Post,
    read_model::ReadModel,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> EventLog {
    let pool = db::create_pool(&dir.path().join("inari.sqlite"), DatabaseOptions::default())
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    let backend: Arc<dyn BlobBackend> = Arc::new(DiskBlobBackend::new(dir.path().join("blobs")));

    EventLog::new(
        backend,
        pool,
        EventLogConfig {
            bucket: "events".to_string(),
            prefix: "events".to_string(),
            projection: ProjectionConfig {
                media_base_url: "https://media.example".to_string(),
                note_policy: NotePolicy::Include,
            },
        },
    )
}

fn post(n: usize) -> Post {
    Post::new("h-entry")
        .with_property("uid", format!("post-{:02}", n))
        .with_property("url", format!("https://site.example/p/post-{:02}", n))
        .with_property("published", format!("2019-01-{:02}T12:00:00Z", n + 1))
        .with_property("content", format!("post number {}", n))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_are_all_projected() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir).await;

    let tasks = (0..20).map(|n| {
        let log = log.clone();
        tokio::spawn(async move {
            let event: Event = PostCreatedEvent::new(post(n), &SystemClock).into();
            log.append(&event).await
        })
    });
    let outcomes = join_all(tasks).await;

    for outcome in outcomes {
        assert_eq!(outcome.unwrap().unwrap(), ReduceOutcome::Applied);
    }

    let read_model = ReadModel::new(log.db().clone());
    let page = read_model.post_list(50, None).await.unwrap();
    assert_eq!(page.items.len(), 20);
    assert_eq!(page.items[0].uid(), Some("post-19"));

    // The disk log rebuilds the same projection from scratch
    let report = log.replay().await.unwrap();
    assert_eq!((report.listed, report.applied), (20, 20));
    assert_eq!(read_model.post_list(50, None).await.unwrap(), page);
}

#[tokio::test]
async fn test_projection_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let log = open(&dir).await;
        log.append(&PostCreatedEvent::new(post(1), &SystemClock).into())
            .await
            .unwrap();
        log.db().close().await;
    }

    let log = open(&dir).await;
    let read_model = ReadModel::new(log.db().clone());
    assert!(read_model
        .post_by_url("https://site.example/p/post-01")
        .await
        .unwrap()
        .is_some());
}
