//! Catalog storage using SQLite
//!
//! This module is the single source of truth for:
//! - Books (canonical records with external identifiers)
//! - Book events (append-only read/owned status history)
//! - Feed and scrape caches (see `cache`)
//!
//! A book's `status_read`/`status_owned` columns are a projection of its latest event
//! on each track and are refreshed in the same transaction that appends the event.

mod cache;
mod models;
mod schema;

pub use cache::CachedFeed;
pub use models::*;
pub use schema::SCHEMA_SQL;

use crate::config::Config;
use crate::dates::now_canonical;
use crate::error::{Error, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Catalog database handle
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Connect to the catalog database configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open (creating if needed) the database at `db_path` and make sure the schema exists
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        if !catalog.is_initialized().await? {
            catalog.init_schema().await?;
        }
        Ok(catalog)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='book'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; clones of this handle stop working afterwards
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ===== Feed Import =====

    /// Insert feed books that are not yet known by feed id. Existing rows are never
    /// touched. Returns the number of rows inserted.
    pub async fn upsert_books_from_feed(&self, books: &[FeedBook]) -> Result<u64> {
        let now = now_canonical();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for book in books {
            let result = sqlx::query(
                r#"
                INSERT INTO book (oku_id, title, author, image_url, description, date_published, date_created, date_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(oku_id) DO NOTHING
                "#,
            )
            .bind(&book.oku_id)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.image_url)
            .bind(&book.description)
            .bind(&book.date_published)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!("Inserted {} of {} feed books", inserted, books.len());
        Ok(inserted)
    }

    /// Append feed events. Events for unknown feed ids are skipped, and an event
    /// already stored for the same (book, type, date) is a no-op. Returns the number
    /// of events inserted.
    pub async fn append_events(&self, events: &[FeedEvent]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        let mut touched = BTreeSet::new();

        for event in events {
            let book_id: Option<i64> = sqlx::query_scalar("SELECT id FROM book WHERE oku_id = ?")
                .bind(&event.oku_id)
                .fetch_optional(&mut *tx)
                .await?;

            let Some(book_id) = book_id else {
                debug!("Skipping event for unknown feed book {}", event.oku_id);
                continue;
            };

            let kind = EventType::Feed(event.feed);
            let result = sqlx::query(
                r#"
                INSERT INTO book_event (book_id, event_type, track, status, date_created)
                SELECT ?, ?, ?, ?, ?
                WHERE NOT EXISTS (
                    SELECT 1 FROM book_event
                    WHERE book_id = ? AND event_type = ? AND date_created = ?
                )
                "#,
            )
            .bind(book_id)
            .bind(kind.tag())
            .bind(kind.track())
            .bind(kind.status())
            .bind(&event.date)
            .bind(book_id)
            .bind(kind.tag())
            .bind(&event.date)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += result.rows_affected();
                touched.insert(book_id);
            }
        }

        for book_id in touched {
            refresh_status(&mut *tx, book_id).await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    // ===== Status Changes =====

    /// Append one explicit status event and return the refreshed book
    pub async fn record_status_change(&self, book_id: i64, change: StatusChange) -> Result<Book> {
        let kind = change.event_type()?;
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM book WHERE id = ?")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::BookNotFound(book_id));
        }

        insert_event(&mut *tx, book_id, kind, &now_canonical()).await?;
        refresh_status(&mut *tx, book_id).await?;
        tx.commit().await?;

        info!("Book {} marked {}", book_id, kind.tag());
        self.get_by_id(book_id)
            .await?
            .ok_or(Error::BookNotFound(book_id))
    }

    // ===== Reads =====

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM book WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    pub async fn get_by_status(&self, status: ReadStatus) -> Result<Vec<Book>> {
        let books =
            sqlx::query_as::<_, Book>("SELECT * FROM book WHERE status_read = ? ORDER BY id")
                .bind(status)
                .fetch_all(&self.pool)
                .await?;
        Ok(books)
    }

    /// Case-insensitive title substring search. A blank query matches nothing.
    ///
    /// Matching uses Unicode lower-casing, which SQLite's `LIKE` only does for ASCII,
    /// so titles are filtered here rather than in SQL.
    pub async fn search(&self, query: &str) -> Result<Vec<Book>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let books = sqlx::query_as::<_, Book>("SELECT * FROM book ORDER BY title, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books
            .into_iter()
            .filter(|book| book.title.to_lowercase().contains(&needle))
            .collect())
    }

    /// List books, optionally filtered by status, ordered by the latest event on one track.
    /// Books without any event on that track sort last in either direction.
    pub async fn list_all(&self, options: &ListOptions) -> Result<Vec<Book>> {
        let mut sql = String::from("SELECT * FROM book");
        let mut conditions = Vec::new();
        if options.filter.read.is_some() {
            conditions.push("status_read = ?");
        }
        if options.filter.owned.is_some() {
            conditions.push("status_owned = ?");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let order = options.order.keyword();
        sql.push_str(&format!(
            " ORDER BY {} {} NULLS LAST, id {}",
            options.sort_by.column(),
            order,
            order
        ));
        if options.page.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query_as::<_, Book>(&sql);
        if let Some(read) = options.filter.read {
            query = query.bind(read);
        }
        if let Some(owned) = options.filter.owned {
            query = query.bind(owned);
        }
        if let Some(page) = options.page {
            query = query.bind(page.limit).bind(page.offset);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn count_books(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// A book's events, newest first
    pub async fn events_for_book(&self, book_id: i64) -> Result<Vec<BookEvent>> {
        let events = sqlx::query_as::<_, BookEvent>(
            "SELECT * FROM book_event WHERE book_id = ? ORDER BY date_created DESC, id DESC",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Recent events across the catalog, newest first, each with its book.
    ///
    /// A read filter keeps read-track events with that status, an owned filter keeps
    /// owned-track events with that status; with both set either may match.
    pub async fn recent_events(
        &self,
        filter: StatusFilter,
        page: Page,
    ) -> Result<Vec<ActivityEntry>> {
        let mut sql = String::from("SELECT * FROM book_event");
        let mut conditions = Vec::new();
        if filter.read.is_some() {
            conditions.push("(track = 'read' AND status = ?)");
        }
        if filter.owned.is_some() {
            conditions.push("(track = 'owned' AND status = ?)");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" OR "));
        }
        sql.push_str(" ORDER BY date_created DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, BookEvent>(&sql);
        if let Some(read) = filter.read {
            query = query.bind(read.as_str());
        }
        if let Some(owned) = filter.owned {
            query = query.bind(owned.as_str());
        }
        let events = query
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let mut books: HashMap<i64, Book> = HashMap::new();
        let mut entries = Vec::with_capacity(events.len());
        for event in events {
            let book = match books.get(&event.book_id) {
                Some(book) => book.clone(),
                None => {
                    let book = self
                        .get_by_id(event.book_id)
                        .await?
                        .ok_or(Error::BookNotFound(event.book_id))?;
                    books.insert(book.id, book.clone());
                    book
                }
            };
            entries.push(ActivityEntry { event, book });
        }
        Ok(entries)
    }

    // ===== Creation & Edits =====

    /// Create a book from scraped metadata plus one seed event per track, atomically.
    /// Fails with `Conflict` if any scraped identifier already belongs to another book.
    pub async fn create_from_scrape(
        &self,
        read: ReadStatus,
        owned: OwnedStatus,
        scraped: &ScrapedBook,
    ) -> Result<Book> {
        if scraped.title.trim().is_empty() {
            return Err(Error::Validation("a book needs a title".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let identifiers = [
            ("goodreads_id", &scraped.goodreads_id),
            ("amazon_id", &scraped.amazon_id),
            ("isbn", &scraped.isbn),
            ("isbn13", &scraped.isbn13),
        ];
        for (column, value) in identifiers {
            let Some(value) = value else { continue };
            let owner: Option<i64> =
                sqlx::query_scalar(&format!("SELECT id FROM book WHERE {} = ?", column))
                    .bind(value)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(owner) = owner {
                return Err(Error::Conflict(format!(
                    "{} {} already belongs to book {}",
                    column, value, owner
                )));
            }
        }

        let now = now_canonical();
        let result = sqlx::query(
            r#"
            INSERT INTO book (title, author, image_url, description, goodreads_id, amazon_id,
                              isbn, isbn13, asin, date_published, date_created, date_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scraped.title)
        .bind(&scraped.author)
        .bind(&scraped.image_url)
        .bind(&scraped.description)
        .bind(&scraped.goodreads_id)
        .bind(&scraped.amazon_id)
        .bind(&scraped.isbn)
        .bind(&scraped.isbn13)
        .bind(&scraped.asin)
        .bind(&scraped.date_published)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::conflict_on_unique(e, "book identifier"))?;

        let book_id = result.last_insert_rowid();
        insert_event(&mut *tx, book_id, EventType::Read(read), &now).await?;
        insert_event(&mut *tx, book_id, EventType::Owned(owned), &now).await?;
        refresh_status(&mut *tx, book_id).await?;
        tx.commit().await?;

        info!("Created book {} ({})", book_id, scraped.title);
        self.get_by_id(book_id)
            .await?
            .ok_or(Error::BookNotFound(book_id))
    }

    /// Write scraped metadata onto an existing book and cache it under `isbn`.
    ///
    /// The enrichment columns are overwritten wholesale, so applying the same result
    /// twice leaves the same state.
    pub async fn apply_enrichment(
        &self,
        book_id: i64,
        isbn: &str,
        scraped: &ScrapedBook,
    ) -> Result<()> {
        let now = now_canonical();
        let json = serde_json::to_string(scraped)?;
        let mut tx = self.pool.begin().await?;

        cache::upsert_scrape(&mut *tx, isbn, &json, &now).await?;

        let result = sqlx::query(
            r#"
            UPDATE book SET
                image_url = ?,
                description = ?,
                isbn = ?,
                isbn13 = ?,
                asin = ?,
                goodreads_id = ?,
                amazon_id = ?,
                date_published = ?,
                date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(&scraped.image_url)
        .bind(&scraped.description)
        .bind(isbn)
        .bind(&scraped.isbn13)
        .bind(&scraped.asin)
        .bind(&scraped.goodreads_id)
        .bind(&scraped.amazon_id)
        .bind(&scraped.date_published)
        .bind(&now)
        .bind(book_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::conflict_on_unique(e, "enrichment identifier"))?;

        if result.rows_affected() == 0 {
            return Err(Error::BookNotFound(book_id));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Edit descriptive fields and identifiers. Fields left as `None` keep their value.
    pub async fn update_book(&self, book_id: i64, update: &BookUpdate) -> Result<Book> {
        if update.is_empty() {
            return Err(Error::Validation("nothing to update".to_string()));
        }
        if matches!(&update.title, Some(t) if t.trim().is_empty()) {
            return Err(Error::Validation("title cannot be blank".to_string()));
        }

        let result = sqlx::query(
            r#"
            UPDATE book SET
                title = COALESCE(?, title),
                author = COALESCE(?, author),
                description = COALESCE(?, description),
                image_url = COALESCE(?, image_url),
                isbn = COALESCE(?, isbn),
                isbn13 = COALESCE(?, isbn13),
                asin = COALESCE(?, asin),
                oku_id = COALESCE(?, oku_id),
                goodreads_id = COALESCE(?, goodreads_id),
                amazon_id = COALESCE(?, amazon_id),
                date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.title)
        .bind(&update.author)
        .bind(&update.description)
        .bind(&update.image_url)
        .bind(&update.isbn)
        .bind(&update.isbn13)
        .bind(&update.asin)
        .bind(&update.oku_id)
        .bind(&update.goodreads_id)
        .bind(&update.amazon_id)
        .bind(now_canonical())
        .bind(book_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::conflict_on_unique(e, "book identifier"))?;

        if result.rows_affected() == 0 {
            return Err(Error::BookNotFound(book_id));
        }

        self.get_by_id(book_id)
            .await?
            .ok_or(Error::BookNotFound(book_id))
    }

    // ===== Enrichment Candidates =====

    /// Books without an ISBN, in random order
    pub async fn unenriched_books(&self) -> Result<Vec<EnrichmentCandidate>> {
        let books = sqlx::query_as::<_, EnrichmentCandidate>(
            "SELECT id, title, author FROM book WHERE isbn IS NULL ORDER BY RANDOM()",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    // ===== Statistics =====

    pub async fn stats(&self) -> Result<CatalogStats> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(status_read = 'read'), 0),
                COALESCE(SUM(status_read = 'reading'), 0),
                COALESCE(SUM(status_read = 'not-read'), 0),
                COALESCE(SUM(status_owned = 'owned'), 0),
                COALESCE(SUM(status_owned = 'not-owned'), 0),
                COALESCE(SUM(status_owned = 'on-loan'), 0),
                COALESCE(SUM(status_owned = 'wanted'), 0)
            FROM book
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStats {
            total: row.0,
            read: row.1,
            reading: row.2,
            not_read: row.3,
            owned: row.4,
            not_owned: row.5,
            on_loan: row.6,
            wanted: row.7,
        })
    }
}

async fn insert_event(
    conn: &mut SqliteConnection,
    book_id: i64,
    kind: EventType,
    date: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO book_event (book_id, event_type, track, status, date_created) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(book_id)
    .bind(kind.tag())
    .bind(kind.track())
    .bind(kind.status())
    .bind(date)
    .execute(conn)
    .await?;
    Ok(())
}

/// Recompute the cached status columns from the book's latest event on each track
async fn refresh_status(conn: &mut SqliteConnection, book_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE book SET
            status_read = COALESCE((
                SELECT status FROM book_event
                WHERE book_id = ? AND track = 'read'
                ORDER BY date_created DESC, id DESC LIMIT 1
            ), status_read),
            status_owned = COALESCE((
                SELECT status FROM book_event
                WHERE book_id = ? AND track = 'owned'
                ORDER BY date_created DESC, id DESC LIMIT 1
            ), status_owned),
            date_last_read_event = (
                SELECT MAX(date_created) FROM book_event WHERE book_id = ? AND track = 'read'
            ),
            date_last_owned_event = (
                SELECT MAX(date_created) FROM book_event WHERE book_id = ? AND track = 'owned'
            ),
            date_updated = ?
        WHERE id = ?
        "#,
    )
    .bind(book_id)
    .bind(book_id)
    .bind(book_id)
    .bind(book_id)
    .bind(now_canonical())
    .bind(book_id)
    .execute(conn)
    .await?;
    Ok(())
}
