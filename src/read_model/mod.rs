/// Read model
///
/// Typed queries over the projection: the post feed, media gallery and the
/// archive indexes built from the `year`/`month`/`day` columns.

pub mod models;

pub use models::{MediaArchiveCount, MediaItem, Page, PostArchiveCount};

use crate::{
    error::{InariError, InariResult},
    models::{MediaMetadata, Post},
};
use models::{MediaRow, PostRow};
use sqlx::SqlitePool;

/// Queries over the projection tables
#[derive(Clone)]
pub struct ReadModel {
    db: SqlitePool,
}

fn require(value: &str, what: &str) -> InariResult<()> {
    if value.trim().is_empty() {
        return Err(InariError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn require_limit(limit: u32) -> InariResult<()> {
    if limit == 0 {
        return Err(InariError::Validation("page limit must be at least 1".to_string()));
    }
    Ok(())
}

/// Treat an empty cursor like no cursor
fn cursor(after: Option<&str>) -> Option<&str> {
    after.filter(|a| !a.is_empty())
}

/// Cut a `limit + 1` row fetch down to one page
fn paginate<R, T>(
    mut rows: Vec<R>,
    limit: u32,
    sort_key: impl Fn(&R) -> &str,
    decode: impl Fn(R) -> InariResult<T>,
) -> InariResult<Page<T>> {
    let more = rows.len() > limit as usize;
    rows.truncate(limit as usize);
    let after = if more {
        rows.last().map(|row| sort_key(row).to_string())
    } else {
        None
    };

    let items = rows.into_iter().map(decode).collect::<InariResult<Vec<_>>>()?;
    Ok(Page { items, after })
}

fn media_item(row: MediaRow) -> InariResult<MediaItem> {
    Ok(MediaItem {
        metadata: serde_json::from_str(&row.data)?,
        is_published: row.is_published,
    })
}

impl ReadModel {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Posts newest first, strictly older than `after` when given
    pub async fn post_list(&self, limit: u32, after: Option<&str>) -> InariResult<Page<Post>> {
        require_limit(limit)?;
        let fetch = i64::from(limit) + 1;
        let rows: Vec<PostRow> = match cursor(after) {
            Some(after) => {
                sqlx::query_as(
                    "SELECT data, sort_key FROM posts WHERE sort_key < ?1 ORDER BY sort_key DESC LIMIT ?2",
                )
                .bind(after)
                .bind(fetch)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as("SELECT data, sort_key FROM posts ORDER BY sort_key DESC LIMIT ?1")
                    .bind(fetch)
                    .fetch_all(&self.db)
                    .await?
            }
        };

        paginate(rows, limit, |row| row.sort_key.as_str(), |row| {
            Ok(serde_json::from_str(&row.data)?)
        })
    }

    pub async fn post_by_url(&self, url: &str) -> InariResult<Option<Post>> {
        let data: Option<String> = sqlx::query_scalar("SELECT data FROM posts WHERE id = ?1")
            .bind(url)
            .fetch_optional(&self.db)
            .await?;

        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    pub async fn media_by_url(&self, url: &str) -> InariResult<Option<MediaMetadata>> {
        let data: Option<String> = sqlx::query_scalar("SELECT data FROM media WHERE id = ?1")
            .bind(url)
            .fetch_optional(&self.db)
            .await?;

        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Media newest first, each flagged with its publication state
    pub async fn media_list(&self, limit: u32, after: Option<&str>) -> InariResult<Page<MediaItem>> {
        require_limit(limit)?;
        let fetch = i64::from(limit) + 1;
        let rows: Vec<MediaRow> = match cursor(after) {
            Some(after) => {
                sqlx::query_as(
                    r#"
                    SELECT media.data, media.sort_key, media_published.id IS NOT NULL AS is_published
                    FROM media
                    LEFT JOIN media_published ON media.id = media_published.id
                    WHERE media.sort_key < ?1
                    ORDER BY media.sort_key DESC
                    LIMIT ?2
                    "#,
                )
                .bind(after)
                .bind(fetch)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT media.data, media.sort_key, media_published.id IS NOT NULL AS is_published
                    FROM media
                    LEFT JOIN media_published ON media.id = media_published.id
                    ORDER BY media.sort_key DESC
                    LIMIT ?1
                    "#,
                )
                .bind(fetch)
                .fetch_all(&self.db)
                .await?
            }
        };

        paginate(rows, limit, |row| row.sort_key.as_str(), media_item)
    }

    /// Post counts per year, newest first
    pub async fn post_years(&self) -> InariResult<Vec<PostArchiveCount>> {
        let years: Vec<PostArchiveCount> = sqlx::query_as(
            "SELECT year AS period, COUNT(*) AS count FROM posts GROUP BY year ORDER BY year DESC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(years)
    }

    /// Post counts per month of `year`, newest first
    pub async fn post_months(&self, year: &str) -> InariResult<Vec<PostArchiveCount>> {
        require(year, "year")?;

        let months: Vec<PostArchiveCount> = sqlx::query_as(
            r#"
            SELECT month AS period, COUNT(*) AS count
            FROM posts
            WHERE year = ?1
            GROUP BY month
            ORDER BY month DESC
            "#,
        )
        .bind(year)
        .fetch_all(&self.db)
        .await?;

        Ok(months)
    }

    /// Media counts per year, newest first
    pub async fn media_years(&self) -> InariResult<Vec<MediaArchiveCount>> {
        let years: Vec<MediaArchiveCount> = sqlx::query_as(
            r#"
            SELECT media.year AS period, COUNT(*) AS count, COUNT(media_published.id) AS published_count
            FROM media
            LEFT JOIN media_published ON media.id = media_published.id
            GROUP BY media.year
            ORDER BY media.year DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(years)
    }

    /// Media counts per month of `year`, newest first
    pub async fn media_months(&self, year: &str) -> InariResult<Vec<MediaArchiveCount>> {
        require(year, "year")?;

        let months: Vec<MediaArchiveCount> = sqlx::query_as(
            r#"
            SELECT media.month AS period, COUNT(*) AS count, COUNT(media_published.id) AS published_count
            FROM media
            LEFT JOIN media_published ON media.id = media_published.id
            WHERE media.year = ?1
            GROUP BY media.month
            ORDER BY media.month DESC
            "#,
        )
        .bind(year)
        .fetch_all(&self.db)
        .await?;

        Ok(months)
    }

    /// Media counts per day of `year`-`month`, newest first
    pub async fn media_days(&self, year: &str, month: &str) -> InariResult<Vec<MediaArchiveCount>> {
        require(year, "year")?;
        require(month, "month")?;

        let days: Vec<MediaArchiveCount> = sqlx::query_as(
            r#"
            SELECT media.day AS period, COUNT(*) AS count, COUNT(media_published.id) AS published_count
            FROM media
            LEFT JOIN media_published ON media.id = media_published.id
            WHERE media.year = ?1 AND media.month = ?2
            GROUP BY media.day
            ORDER BY media.day DESC
            "#,
        )
        .bind(year)
        .bind(month)
        .fetch_all(&self.db)
        .await?;

        Ok(days)
    }

    /// Every media item of one month, newest first
    pub async fn media_month(&self, year: &str, month: &str) -> InariResult<Vec<MediaItem>> {
        require(year, "year")?;
        require(month, "month")?;

        let rows: Vec<MediaRow> = sqlx::query_as(
            r#"
            SELECT media.data, media.sort_key, media_published.id IS NOT NULL AS is_published
            FROM media
            LEFT JOIN media_published ON media.id = media_published.id
            WHERE media.year = ?1 AND media.month = ?2
            ORDER BY media.sort_key DESC
            "#,
        )
        .bind(year)
        .bind(month)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(media_item).collect()
    }

    /// Every media item of one day, newest first
    pub async fn media_day(&self, year: &str, month: &str, day: &str) -> InariResult<Vec<MediaItem>> {
        require(year, "year")?;
        require(month, "month")?;
        require(day, "day")?;

        let rows: Vec<MediaRow> = sqlx::query_as(
            r#"
            SELECT media.data, media.sort_key, media_published.id IS NOT NULL AS is_published
            FROM media
            LEFT JOIN media_published ON media.id = media_published.id
            WHERE media.year = ?1 AND media.month = ?2 AND media.day = ?3
            ORDER BY media.sort_key DESC
            "#,
        )
        .bind(year)
        .bind(month)
        .bind(day)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(media_item).collect()
    }
}
