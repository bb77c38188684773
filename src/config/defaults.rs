//! Default values for configuration

/// Default Oku collection feed for finished books
pub fn default_feed_read_url() -> String {
    "https://oku.club/rss/collection/zQtTo".to_string()
}

/// Default Oku collection feed for the to-read list
pub fn default_feed_toread_url() -> String {
    "https://oku.club/rss/collection/JSKHS".to_string()
}

/// Default Oku collection feed for books in progress
pub fn default_feed_reading_url() -> String {
    "https://oku.club/rss/collection/2f67M".to_string()
}

/// Prefix stripped from feed GUIDs to obtain the feed book id
pub fn default_feed_guid_prefix() -> String {
    "https://oku.club/book/".to_string()
}

/// Cached feeds younger than this are served without a network call (7 days)
pub fn default_feed_cache_ttl_hours() -> i64 {
    24 * 7
}

/// Default request timeout in seconds
pub fn default_http_timeout() -> u64 {
    30
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!("shelfish/{}", env!("CARGO_PKG_VERSION"))
}

/// Default Goodreads base URL (overridable, mostly for tests)
pub fn default_scrape_base_url() -> String {
    std::env::var("SHELFISH_SCRAPE_BASE_URL")
        .unwrap_or_else(|_| "https://www.goodreads.com".to_string())
}

/// Scrape requests per second
pub fn default_scrape_rate_limit() -> u32 {
    1
}

/// Job queue polling interval
pub fn default_poll_interval_ms() -> u64 {
    2000
}

/// Sync all feeds before the worker starts
pub fn default_sync_on_start() -> bool {
    true
}

/// Default page size for catalog listings
pub fn default_list_limit() -> i64 {
    50
}
