//! Feed and scrape caches

use super::{Catalog, FeedName, ScrapedBook};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

/// A raw feed payload as last fetched
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CachedFeed {
    pub feed_name: String,
    /// Build date reported by the feed itself, canonical form
    pub build_date: String,
    pub json: String,
    pub date_updated: String,
}

impl Catalog {
    pub async fn feed_cache(&self, feed: FeedName) -> Result<Option<CachedFeed>> {
        let cached =
            sqlx::query_as::<_, CachedFeed>("SELECT * FROM cache_feed WHERE feed_name = ?")
                .bind(feed.as_str())
                .fetch_optional(self.pool())
                .await?;
        Ok(cached)
    }

    /// Replace the cached payload for `feed`
    pub async fn put_feed_cache(
        &self,
        feed: FeedName,
        build_date: &str,
        json: &str,
        now: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_feed (feed_name, build_date, json, date_updated)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(feed_name) DO UPDATE SET
                build_date = excluded.build_date,
                json = excluded.json,
                date_updated = excluded.date_updated
            "#,
        )
        .bind(feed.as_str())
        .bind(build_date)
        .bind(json)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Scraped metadata previously stored for `isbn`
    pub async fn cached_scrape(&self, isbn: &str) -> Result<Option<ScrapedBook>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT json FROM cache_scrape_metadata WHERE isbn = ?")
                .bind(isbn)
                .fetch_optional(self.pool())
                .await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

pub(super) async fn upsert_scrape(
    conn: &mut SqliteConnection,
    isbn: &str,
    json: &str,
    now: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cache_scrape_metadata (isbn, json, date_updated)
        VALUES (?, ?, ?)
        ON CONFLICT(isbn) DO UPDATE SET
            json = excluded.json,
            date_updated = excluded.date_updated
        "#,
    )
    .bind(isbn)
    .bind(json)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}
