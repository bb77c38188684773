//! Status command implementation

use super::jobs::{cmd_jobs_count, JobCounts};
use crate::catalog::{Catalog, CatalogStats};
use crate::config::Config;
use crate::error::Result;
use crate::jobs::JobQueue;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub catalog: CatalogStats,
    pub jobs: JobCounts,
}

/// Get catalog and queue statistics
pub async fn cmd_status(config: &Config, catalog: &Catalog, queue: &JobQueue) -> Result<StatusInfo> {
    info!("Getting status");

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        catalog: catalog.stats().await?,
        jobs: cmd_jobs_count(queue).await?,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    let stats = &status.catalog;
    println!("\n📊 shelfish Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("\nBooks: {}", stats.total);
    println!("  Read: {}", stats.read);
    println!("  Reading: {}", stats.reading);
    println!("  Not read: {}", stats.not_read);
    println!("\nOwnership:");
    println!("  Owned: {}", stats.owned);
    println!("  Not owned: {}", stats.not_owned);
    println!("  On loan: {}", stats.on_loan);
    println!("  Wanted: {}", stats.wanted);
    println!(
        "\nJobs: {} active, {} succeeded, {} failed",
        status.jobs.active, status.jobs.success, status.jobs.failure
    );
}
