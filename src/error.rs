//! Custom error types for shelfish

use thiserror::Error;

/// Main error type for shelfish operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input; fatal to the single call
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external identifier is already owned by another book
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unrecognized date: {0}")]
    DateFormat(String),

    /// The fetched page did not have the expected shape
    #[error("Scrape failed for {url}: {reason}")]
    Scrape { url: String, reason: String },

    /// Network or HTTP status failure talking to an external source
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Book not found: {0}")]
    BookNotFound(i64),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    pub fn scrape(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Scrape {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Map a unique-constraint violation onto `Conflict`, leaving other errors untouched
    pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> Self {
        match err.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => {
                Error::Conflict(format!("{}: {}", what, db_err.message()))
            }
            _ => Error::Database(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        Error::fetch(url, err)
    }
}

/// Result type alias for shelfish
pub type Result<T> = std::result::Result<T, Error>;
