//! Feed sync command

use crate::feed::{FeedImporter, FeedName, SyncFailure, SyncReport};
use tracing::info;

/// Sync one list, or every list when `feed` is `None`
pub async fn cmd_sync(importer: &FeedImporter, feed: Option<FeedName>) -> SyncReport {
    let Some(feed) = feed else {
        return importer.sync_all().await;
    };

    info!("Syncing {} list", feed);
    let mut report = SyncReport::default();
    match importer.sync_feed(feed).await {
        Ok(list) => report.lists.push(list),
        Err(e) => report.failures.push(SyncFailure {
            feed,
            error: e.to_string(),
        }),
    }
    report
}

/// Print sync results to console
pub fn print_sync_report(report: &SyncReport) {
    for list in &report.lists {
        println!(
            "✓ {}: {} entries, {} new book(s), {} new event(s)",
            list.feed, list.entries, list.books_inserted, list.events_inserted
        );
        if list.skipped > 0 {
            println!("  ⚠ {} entries skipped", list.skipped);
        }
    }
    for failure in &report.failures {
        println!("✗ {}: {}", failure.feed, failure.error);
    }
}
