//! Subscription feed import
//!
//! This module provides:
//! - Fetching the per-list RSS feeds, with a build-date based cache
//! - Mapping feed entries to canonical books and status events
//! - Sequential sync of every list, tolerant of per-list failure

mod rss;

pub use crate::catalog::FeedName;
pub use rss::*;

use crate::catalog::{Catalog, FeedBook, FeedEvent};
use crate::config::FeedConfig;
use crate::dates::{canonicalize, now_canonical, older_than_hours, parse_date};
use crate::error::{Error, Result};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One feed entry in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub book: FeedBook,
    pub event: FeedEvent,
}

/// Lazy mapping of a raw feed onto canonical records.
///
/// Iterating yields the book and the event of each entry together, in one pass over
/// the items. Cloning restarts the sequence; the output depends only on the input feed.
#[derive(Debug, Clone)]
pub struct CanonicalRecords<'a> {
    feed: FeedName,
    build_date: Option<&'a str>,
    guid_prefix: &'a str,
    items: std::slice::Iter<'a, RawFeedItem>,
}

impl<'a> CanonicalRecords<'a> {
    pub fn new(feed: FeedName, raw: &'a RawFeed, guid_prefix: &'a str) -> Self {
        Self {
            feed,
            build_date: raw.build_date.as_deref(),
            guid_prefix,
            items: raw.items.iter(),
        }
    }

    /// Book projections, skipping entries that fail to map.
    ///
    /// This is a separate walk over a restarted copy of the items; iterate `self`
    /// to get books and events from a single pass.
    pub fn books(&self) -> impl Iterator<Item = FeedBook> + 'a {
        self.clone().filter_map(|r| r.ok()).map(|entry| entry.book)
    }

    /// Status events, skipping entries that fail to map. Like `books`, a separate
    /// walk over a restarted copy of the items.
    pub fn events(&self) -> impl Iterator<Item = FeedEvent> + 'a {
        self.clone().filter_map(|r| r.ok()).map(|entry| entry.event)
    }

    fn map_item(&self, item: &RawFeedItem) -> Result<CanonicalEntry> {
        let guid = item
            .guid
            .as_deref()
            .or(item.link.as_deref())
            .ok_or_else(|| Error::FeedParse("entry has no guid".to_string()))?;
        let oku_id = guid.strip_prefix(self.guid_prefix).unwrap_or(guid).trim();
        if oku_id.is_empty() {
            return Err(Error::FeedParse(format!("entry guid {} has no id", guid)));
        }

        let title = item
            .title
            .clone()
            .ok_or_else(|| Error::FeedParse(format!("entry {} has no title", oku_id)))?;

        let pub_date = item
            .pub_date
            .as_deref()
            .ok_or_else(|| Error::DateFormat(format!("entry {} has no pubDate", oku_id)))?;
        let date = canonicalize(pub_date)?;
        let date_updated = match self.build_date {
            Some(build_date) => canonicalize(build_date)?,
            None => date.clone(),
        };

        Ok(CanonicalEntry {
            book: FeedBook {
                oku_id: oku_id.to_string(),
                title,
                author: item.creator.clone(),
                image_url: item.enclosure_url.clone(),
                description: item.content.clone(),
                date_published: Some(date.clone()),
                date_updated,
            },
            event: FeedEvent {
                feed: self.feed,
                oku_id: oku_id.to_string(),
                date,
            },
        })
    }
}

impl Iterator for CanonicalRecords<'_> {
    type Item = Result<CanonicalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        Some(self.map_item(item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

/// Map a raw feed to canonical records
pub fn canonical_records<'a>(
    feed: FeedName,
    raw: &'a RawFeed,
    guid_prefix: &'a str,
) -> CanonicalRecords<'a> {
    CanonicalRecords::new(feed, raw, guid_prefix)
}

/// Outcome of syncing one list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSyncReport {
    pub feed: FeedName,
    pub entries: usize,
    pub skipped: usize,
    pub books_inserted: u64,
    pub events_inserted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub feed: FeedName,
    pub error: String,
}

/// Outcome of syncing every list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub lists: Vec<ListSyncReport>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Imports subscription feeds into the catalog
#[derive(Clone)]
pub struct FeedImporter {
    catalog: Catalog,
    client: Client,
    config: FeedConfig,
}

impl FeedImporter {
    pub fn new(catalog: Catalog, config: FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            catalog,
            client,
            config,
        })
    }

    /// Return the feed for `feed`, from cache when its reported build date is fresh
    pub async fn fetch_feed(&self, feed: FeedName) -> Result<RawFeed> {
        if let Some(raw) = self.fresh_cached(feed).await? {
            info!("HIT feed cache {}", feed);
            return Ok(raw);
        }

        info!("MISS feed cache {}", feed);
        let url = self.config.url_for(feed);
        debug!("Fetching: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {}", status)));
        }
        let body = response.text().await?;
        let mut raw = parse_rss(&body)?;

        let now = now_canonical();
        let build_date = match raw.build_date.as_deref().map(|d| canonicalize(d)) {
            Some(Ok(date)) => date,
            Some(Err(e)) => {
                warn!("Feed {} has an unreadable build date ({}), using now", feed, e);
                now.clone()
            }
            None => now.clone(),
        };
        raw.build_date = Some(build_date.clone());

        let json = serde_json::to_string(&raw)?;
        self.catalog
            .put_feed_cache(feed, &build_date, &json, &now)
            .await?;
        Ok(raw)
    }

    async fn fresh_cached(&self, feed: FeedName) -> Result<Option<RawFeed>> {
        let Some(cached) = self.catalog.feed_cache(feed).await? else {
            return Ok(None);
        };

        let build_date = match parse_date(&cached.build_date) {
            Ok(date) => date,
            Err(e) => {
                warn!("Ignoring cached feed {}: {}", feed, e);
                return Ok(None);
            }
        };
        if older_than_hours(self.config.cache_ttl_hours, build_date, Utc::now()) {
            return Ok(None);
        }

        match serde_json::from_str(&cached.json) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) => {
                warn!("Ignoring unreadable cached feed {}: {}", feed, e);
                Ok(None)
            }
        }
    }

    /// Fetch one list and write its books and events to the catalog.
    /// Entries that cannot be mapped are logged and skipped.
    pub async fn sync_feed(&self, feed: FeedName) -> Result<ListSyncReport> {
        let raw = self.fetch_feed(feed).await?;

        let mut books = Vec::with_capacity(raw.items.len());
        let mut events = Vec::with_capacity(raw.items.len());
        let mut skipped = 0;
        for record in canonical_records(feed, &raw, &self.config.guid_prefix) {
            match record {
                Ok(entry) => {
                    books.push(entry.book);
                    events.push(entry.event);
                }
                Err(e) => {
                    warn!("Skipping {} entry: {}", feed, e);
                    skipped += 1;
                }
            }
        }

        let books_inserted = self.catalog.upsert_books_from_feed(&books).await?;
        let events_inserted = self.catalog.append_events(&events).await?;

        info!(
            "Synced {}: {} entries, {} new books, {} new events",
            feed,
            raw.items.len(),
            books_inserted,
            events_inserted
        );

        Ok(ListSyncReport {
            feed,
            entries: raw.items.len(),
            skipped,
            books_inserted,
            events_inserted,
        })
    }

    /// Sync every list in order. A failing list is recorded and the rest still run.
    pub async fn sync_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for feed in FeedName::ALL {
            match self.sync_feed(feed).await {
                Ok(list) => report.lists.push(list),
                Err(e) => {
                    warn!("Feed {} failed: {}", feed, e);
                    report.failures.push(SyncFailure {
                        feed,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}
