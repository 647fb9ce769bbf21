/// Append fixture events to the configured event log
///
/// Writes two photo posts and one media upload, then prints what the
/// projection holds. Run against an empty log; re-running appends fresh
/// events with new ids.

use chrono::{DateTime, TimeZone, Utc};
use inari::{
    config::ServerConfig,
    context::AppContext,
    error::{InariError, InariResult},
    eventlog::{Event, MediaUploadedEvent, PostCreatedEvent, SystemClock},
    logging,
    models::{MediaMetadata, Post},
};

const SEED_MEDIA_KEY: &str = "2019/b8ea8e3ce769f2a54454d3818f90bbbf.jpg";

fn seed_post(config: &ServerConfig, uid: &str, content: &str, photo: &str) -> Post {
    Post::new("h-entry")
        .with_property("uid", uid)
        .with_property("url", format!("{}/p/{}", config.site.url.trim_end_matches('/'), uid))
        .with_property("published", "2019-01-28T13:13:13+00:00")
        .with_property("author", config.site.author.as_str())
        .with_property("photo", photo)
        .with_property("content", content)
}

fn seed_media(captured: DateTime<Utc>) -> MediaMetadata {
    MediaMetadata {
        uid: "12345".to_string(),
        url: String::new(),
        file_key: SEED_MEDIA_KEY.to_string(),
        file_hash: "b8ea8e3ce769f2a54454d3818f90bbbf".to_string(),
        mime_type: "image/jpeg".to_string(),
        date_time: Some(captured.fixed_offset()),
        lat: Some(53.800755),
        lng: Some(-1.549077),
    }
}

#[tokio::main]
async fn main() -> InariResult<()> {
    let config = ServerConfig::from_env()?;
    logging::init(&config.logging);

    let ctx = AppContext::new(config).await?;
    let clock = SystemClock;

    let seeded_photo = MediaMetadata::public_url(&ctx.config.media.base_url, SEED_MEDIA_KEY);
    let other_photo = MediaMetadata::public_url(
        &ctx.config.media.base_url,
        "2019/3e715dddf64a622115ca58e61c2121b1.jpg",
    );

    let captured = Utc
        .with_ymd_and_hms(2018, 1, 28, 0, 0, 0)
        .single()
        .ok_or_else(|| InariError::Internal("invalid seed capture date".to_string()))?;

    let mut events: Vec<Event> = vec![
        PostCreatedEvent::new(
            seed_post(&ctx.config, "test123", "hello this is a test", &seeded_photo),
            &clock,
        )
        .into(),
        PostCreatedEvent::new(
            seed_post(&ctx.config, "test124", "hello this is a test 2", &other_photo)
                .with_property("category", "tag1")
                .with_property("category", "tag2"),
            &clock,
        )
        .into(),
    ];
    events.push(MediaUploadedEvent::new(seed_media(captured), &clock).into());

    for event in &events {
        ctx.event_log.append(event).await?;
    }

    let posts = ctx.read_model.post_list(10, None).await?;
    let years = ctx.read_model.media_years().await?;
    println!("Seeded {} events", events.len());
    for post in &posts.items {
        println!("  post  {}", post.url().unwrap_or("<no url>"));
    }
    for year in &years {
        println!(
            "  media {}: {} item(s), {} published",
            year.period, year.count, year.published_count
        );
    }

    Ok(())
}
