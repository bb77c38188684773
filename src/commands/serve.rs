//! Long-running service: initial sync, then the background job worker

use super::sync::print_sync_report;
use crate::config::Config;
use crate::error::Result;
use crate::feed::FeedImporter;
use crate::jobs::{JobQueue, JobWorker};
use tracing::{info, warn};

/// Run until Ctrl-C. Jobs orphaned in `running` by an earlier process are
/// re-queued first. With `jobs.sync_on_start` the feeds are synced and
/// enrichment jobs re-seeded before the worker starts polling.
pub async fn cmd_serve(config: &Config, importer: &FeedImporter, queue: JobQueue) -> Result<()> {
    queue.recover_orphaned().await?;

    if config.jobs.sync_on_start {
        let report = importer.sync_all().await;
        if !report.is_complete() {
            warn!("{} list(s) failed to sync", report.failures.len());
        }
        print_sync_report(&report);
        queue.enqueue_enrichment_jobs().await?;
    }

    let worker = JobWorker::new(queue, config.jobs.poll_interval()).spawn();
    info!("shelfish is running, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
    }

    worker.stop().await;
    Ok(())
}
