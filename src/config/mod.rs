//! Configuration management for shelfish
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::feed::FeedName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Subscription feed configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Enrichment scraper configuration
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Background job configuration
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Subscription feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed URL for the "read" list
    #[serde(default = "default_feed_read_url")]
    pub read_url: String,

    /// Feed URL for the "toread" list
    #[serde(default = "default_feed_toread_url")]
    pub toread_url: String,

    /// Feed URL for the "reading" list
    #[serde(default = "default_feed_reading_url")]
    pub reading_url: String,

    /// Prefix stripped from entry GUIDs to get the feed book id
    #[serde(default = "default_feed_guid_prefix")]
    pub guid_prefix: String,

    /// Freshness window for cached feeds, measured from the feed's build date
    #[serde(default = "default_feed_cache_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Enrichment scraper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Base URL of the book-detail site
    #[serde(default = "default_scrape_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Maximum requests per second against the site
    #[serde(default = "default_scrape_rate_limit")]
    pub requests_per_second: u32,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Delay between polls of the job queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Run a full feed sync when the service starts
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for shelfish data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            read_url: default_feed_read_url(),
            toread_url: default_feed_toread_url(),
            reading_url: default_feed_reading_url(),
            guid_prefix: default_feed_guid_prefix(),
            cache_ttl_hours: default_feed_cache_ttl_hours(),
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl FeedConfig {
    /// URL of the feed for one subscription list
    pub fn url_for(&self, feed: FeedName) -> &str {
        match feed {
            FeedName::Read => &self.read_url,
            FeedName::ToRead => &self.toread_url,
            FeedName::Reading => &self.reading_url,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: default_scrape_base_url(),
            timeout_secs: default_http_timeout(),
            requests_per_second: default_scrape_rate_limit(),
            user_agent: default_user_agent(),
        }
    }
}

impl ScrapeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            sync_on_start: default_sync_on_start(),
        }
    }
}

impl JobsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 100 years
const MAX_CACHE_TTL_HOURS: i64 = 100 * 366 * 24;

impl Config {
    /// Get the default base directory for shelfish (~/.shelfish)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shelfish")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Default configuration rooted at `base_dir` (or the default base dir)
    pub fn with_base_dir(base_dir: Option<PathBuf>) -> Self {
        let mut config = Config::default();
        config.init_paths(base_dir);
        config
    }

    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("shelfish.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("shelfish.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::with_base_dir(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for feed in FeedName::ALL {
            let url = self.feed.url_for(feed);
            Url::parse(url).map_err(|e| {
                Error::Config(format!("feed.{}_url is not a valid URL ({}): {}", feed, e, url))
            })?;
        }

        Url::parse(&self.scrape.base_url).map_err(|e| {
            Error::Config(format!(
                "scrape.base_url is not a valid URL ({}): {}",
                e, self.scrape.base_url
            ))
        })?;

        if self.feed.cache_ttl_hours <= 0 || self.feed.cache_ttl_hours > MAX_CACHE_TTL_HOURS {
            return Err(Error::Config(format!(
                "feed.cache_ttl_hours must be between 1 and {}",
                MAX_CACHE_TTL_HOURS
            )));
        }

        if self.feed.timeout_secs == 0 || self.scrape.timeout_secs == 0 {
            return Err(Error::Config(
                "feed.timeout_secs and scrape.timeout_secs must be positive".to_string(),
            ));
        }

        if self.scrape.requests_per_second == 0 {
            return Err(Error::Config(
                "scrape.requests_per_second must be positive".to_string(),
            ));
        }

        if self.jobs.poll_interval_ms == 0 {
            return Err(Error::Config(
                "jobs.poll_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
