//! Catalog record types

use crate::config::default_list_limit;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Reading status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum ReadStatus {
    Read,
    NotRead,
    Reading,
}

impl ReadStatus {
    pub const ALL: [ReadStatus; 3] = [ReadStatus::Read, ReadStatus::NotRead, ReadStatus::Reading];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::Read => "read",
            ReadStatus::NotRead => "not-read",
            ReadStatus::Reading => "reading",
        }
    }
}

impl std::fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(ReadStatus::Read),
            "not-read" => Ok(ReadStatus::NotRead),
            "reading" => Ok(ReadStatus::Reading),
            _ => Err(Error::Validation(format!("Unknown read status: {}", s))),
        }
    }
}

/// Ownership status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum OwnedStatus {
    Owned,
    NotOwned,
    OnLoan,
    Wanted,
}

impl OwnedStatus {
    pub const ALL: [OwnedStatus; 4] = [
        OwnedStatus::Owned,
        OwnedStatus::NotOwned,
        OwnedStatus::OnLoan,
        OwnedStatus::Wanted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OwnedStatus::Owned => "owned",
            OwnedStatus::NotOwned => "not-owned",
            OwnedStatus::OnLoan => "on-loan",
            OwnedStatus::Wanted => "wanted",
        }
    }
}

impl std::fmt::Display for OwnedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnedStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "owned" => Ok(OwnedStatus::Owned),
            "not-owned" => Ok(OwnedStatus::NotOwned),
            "on-loan" => Ok(OwnedStatus::OnLoan),
            "wanted" => Ok(OwnedStatus::Wanted),
            _ => Err(Error::Validation(format!("Unknown owned status: {}", s))),
        }
    }
}

/// A subscription list on the feed provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedName {
    Read,
    ToRead,
    Reading,
}

impl FeedName {
    /// Sync order for a full import
    pub const ALL: [FeedName; 3] = [FeedName::Read, FeedName::ToRead, FeedName::Reading];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedName::Read => "read",
            FeedName::ToRead => "toread",
            FeedName::Reading => "reading",
        }
    }

    /// The read status a book on this list is in
    pub fn read_status(&self) -> ReadStatus {
        match self {
            FeedName::Read => ReadStatus::Read,
            FeedName::ToRead => ReadStatus::NotRead,
            FeedName::Reading => ReadStatus::Reading,
        }
    }
}

impl std::fmt::Display for FeedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(FeedName::Read),
            "toread" | "not-read" => Ok(FeedName::ToRead),
            "reading" => Ok(FeedName::Reading),
            _ => Err(Error::Validation(format!("Unknown feed: {}", s))),
        }
    }
}

/// The two independent status tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Track {
    Read,
    Owned,
}

/// What a book event records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Read(ReadStatus),
    Owned(OwnedStatus),
    /// Seen on a subscription list; counts as a read-track event
    Feed(FeedName),
}

impl EventType {
    /// Value stored in `book_event.event_type`
    pub fn tag(&self) -> &'static str {
        match self {
            EventType::Read(s) => s.as_str(),
            EventType::Owned(s) => s.as_str(),
            EventType::Feed(f) => f.as_str(),
        }
    }

    pub fn track(&self) -> Track {
        match self {
            EventType::Read(_) | EventType::Feed(_) => Track::Read,
            EventType::Owned(_) => Track::Owned,
        }
    }

    /// Status value this event sets on its track
    pub fn status(&self) -> &'static str {
        match self {
            EventType::Read(s) => s.as_str(),
            EventType::Owned(s) => s.as_str(),
            EventType::Feed(f) => f.read_status().as_str(),
        }
    }
}

/// A canonical catalog record
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub status_read: ReadStatus,
    pub status_owned: OwnedStatus,
    pub oku_id: Option<String>,
    pub goodreads_id: Option<String>,
    pub amazon_id: Option<String>,
    pub isbn: Option<String>,
    pub isbn13: Option<String>,
    pub asin: Option<String>,
    pub date_published: Option<String>,
    pub date_last_read_event: Option<String>,
    pub date_last_owned_event: Option<String>,
    pub date_created: String,
    pub date_updated: String,
}

/// An immutable status fact about a book
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct BookEvent {
    pub id: i64,
    pub book_id: i64,
    pub event_type: String,
    pub track: Track,
    pub status: String,
    pub date_created: String,
}

/// A book event together with the book it refers to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub event: BookEvent,
    pub book: Book,
}

/// A book as described by a feed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedBook {
    pub oku_id: String,
    pub title: String,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub date_published: Option<String>,
    pub date_updated: String,
}

/// A feed entry seen as a status event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub feed: FeedName,
    pub oku_id: String,
    pub date: String,
}

/// Metadata pulled from a book-detail page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrapedBook {
    /// Detail page the fields were read from
    #[serde(default)]
    pub url: String,
    pub goodreads_id: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub isbn13: Option<String>,
    pub asin: Option<String>,
    pub date_published: Option<String>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub amazon_id: Option<String>,
}

/// A single status change; exactly one axis must be set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusChange {
    pub read: Option<ReadStatus>,
    pub owned: Option<OwnedStatus>,
}

impl StatusChange {
    pub fn read(status: ReadStatus) -> Self {
        Self {
            read: Some(status),
            owned: None,
        }
    }

    pub fn owned(status: OwnedStatus) -> Self {
        Self {
            read: None,
            owned: Some(status),
        }
    }

    pub fn event_type(&self) -> Result<EventType> {
        match (self.read, self.owned) {
            (Some(read), None) => Ok(EventType::Read(read)),
            (None, Some(owned)) => Ok(EventType::Owned(owned)),
            (None, None) => Err(Error::Validation(
                "a status change needs a read or an owned status".to_string(),
            )),
            (Some(_), Some(_)) => Err(Error::Validation(
                "cannot change read and owned status in the same call".to_string(),
            )),
        }
    }
}

/// Partial edit of a book's descriptive fields and identifiers.
///
/// `None` leaves a column unchanged, so a value cannot be cleared through an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub isbn: Option<String>,
    pub isbn13: Option<String>,
    pub asin: Option<String>,
    pub oku_id: Option<String>,
    pub goodreads_id: Option<String>,
    pub amazon_id: Option<String>,
}

impl BookUpdate {
    pub fn is_empty(&self) -> bool {
        *self == BookUpdate::default()
    }
}

/// Which event timestamp to order listings by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Read,
    Owned,
}

impl SortBy {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortBy::Read => "date_last_read_event",
            SortBy::Owned => "date_last_owned_event",
        }
    }
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(SortBy::Read),
            "owned" => Ok(SortBy::Owned),
            _ => Err(Error::Validation(format!("Unknown sort key: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(Error::Validation(format!("Unknown sort order: {}", s))),
        }
    }
}

/// Limit/offset window over a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: default_list_limit(),
            offset: 0,
        }
    }
}

/// Equality filters on the two status axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFilter {
    pub read: Option<ReadStatus>,
    pub owned: Option<OwnedStatus>,
}

/// Options for `Catalog::list_all`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub filter: StatusFilter,
    pub sort_by: SortBy,
    pub order: SortOrder,
    /// `None` returns every matching book
    pub page: Option<Page>,
}

/// A book that still needs enrichment
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EnrichmentCandidate {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
}

/// Catalog-wide counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total: i64,
    pub read: i64,
    pub reading: i64,
    pub not_read: i64,
    pub owned: i64,
    pub not_owned: i64,
    pub on_loan: i64,
    pub wanted: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in ReadStatus::ALL {
            assert_eq!(status.as_str().parse::<ReadStatus>().unwrap(), status);
        }
        for status in OwnedStatus::ALL {
            assert_eq!(status.as_str().parse::<OwnedStatus>().unwrap(), status);
        }
        assert!("finished".parse::<ReadStatus>().is_err());
        assert!("borrowed".parse::<OwnedStatus>().is_err());
    }

    #[test]
    fn test_feed_events_land_on_read_track() {
        let toread = EventType::Feed(FeedName::ToRead);
        assert_eq!(toread.tag(), "toread");
        assert_eq!(toread.track(), Track::Read);
        assert_eq!(toread.status(), "not-read");

        let owned = EventType::Owned(OwnedStatus::OnLoan);
        assert_eq!(owned.track(), Track::Owned);
        assert_eq!(owned.status(), "on-loan");
    }

    #[test]
    fn test_status_change_requires_exactly_one_axis() {
        assert!(matches!(
            StatusChange::default().event_type(),
            Err(Error::Validation(_))
        ));
        let both = StatusChange {
            read: Some(ReadStatus::Read),
            owned: Some(OwnedStatus::Owned),
        };
        assert!(matches!(both.event_type(), Err(Error::Validation(_))));
        assert_eq!(
            StatusChange::read(ReadStatus::Reading).event_type().unwrap(),
            EventType::Read(ReadStatus::Reading)
        );
    }

    #[test]
    fn test_feed_name_parsing_accepts_status_alias() {
        assert_eq!("toread".parse::<FeedName>().unwrap(), FeedName::ToRead);
        assert_eq!("not-read".parse::<FeedName>().unwrap(), FeedName::ToRead);
        assert!("wishlist".parse::<FeedName>().is_err());
    }
}
