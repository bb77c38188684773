//! SQLite schema definition

/// SQL schema for the catalog database
pub const SCHEMA_SQL: &str = r#"
-- Books: one row per catalog entry. External identifiers are unique when present.
CREATE TABLE IF NOT EXISTS book (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT,
    image_url TEXT,
    description TEXT,
    status_read TEXT NOT NULL DEFAULT 'not-read',
    status_owned TEXT NOT NULL DEFAULT 'not-owned',
    oku_id TEXT UNIQUE,
    goodreads_id TEXT UNIQUE,
    amazon_id TEXT UNIQUE,
    isbn TEXT UNIQUE,
    isbn13 TEXT UNIQUE,
    asin TEXT,
    date_published TEXT,
    date_last_read_event TEXT,
    date_last_owned_event TEXT,
    date_created TEXT NOT NULL,
    date_updated TEXT NOT NULL
);

-- Book events: append-only status history
CREATE TABLE IF NOT EXISTS book_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id INTEGER NOT NULL REFERENCES book(id),
    event_type TEXT NOT NULL,
    track TEXT NOT NULL,
    status TEXT NOT NULL,
    date_created TEXT NOT NULL
);

-- Background jobs
CREATE TABLE IF NOT EXISTS job_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type TEXT NOT NULL,
    job_status TEXT NOT NULL DEFAULT 'pending',
    payload TEXT NOT NULL,
    error TEXT,
    date_created TEXT NOT NULL,
    date_updated TEXT NOT NULL
);

-- Raw feed payloads, one per subscription list
CREATE TABLE IF NOT EXISTS cache_feed (
    feed_name TEXT PRIMARY KEY,
    build_date TEXT NOT NULL,
    json TEXT NOT NULL,
    date_updated TEXT NOT NULL
);

-- Scraped metadata keyed by ISBN
CREATE TABLE IF NOT EXISTS cache_scrape_metadata (
    isbn TEXT PRIMARY KEY,
    json TEXT NOT NULL,
    date_updated TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_book_status_read ON book(status_read);
CREATE INDEX IF NOT EXISTS idx_book_status_owned ON book(status_owned);
CREATE INDEX IF NOT EXISTS idx_event_book ON book_event(book_id, track, date_created);
CREATE INDEX IF NOT EXISTS idx_event_date ON book_event(date_created);
CREATE INDEX IF NOT EXISTS idx_job_status ON job_queue(job_status, date_created);
"#;
