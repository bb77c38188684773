//! shelfish - a personal book catalog
//!
//! This crate provides:
//! - A SQLite catalog of books with an append-only status event history
//! - Import of reading-list RSS feeds with a TTL-bounded feed cache
//! - Metadata enrichment scraped from book detail pages
//! - A persistent job queue drained by a background worker

pub mod catalog;
pub mod commands;
pub mod config;
pub mod dates;
pub mod error;
pub mod feed;
pub mod jobs;
pub mod scrape;

pub use config::Config;
pub use error::{Error, Result};
