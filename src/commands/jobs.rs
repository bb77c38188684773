//! Job queue commands

use crate::error::Result;
use crate::jobs::{JobQueue, JobRecord, JobStatus, RunOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Queue counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: i64,
    pub running: i64,
    pub success: i64,
    pub failure: i64,
    /// pending + running
    pub active: i64,
}

pub async fn cmd_jobs_list(queue: &JobQueue) -> Result<Vec<JobRecord>> {
    queue.list().await
}

pub async fn cmd_jobs_count(queue: &JobQueue) -> Result<JobCounts> {
    Ok(JobCounts {
        pending: queue.count_by_status(JobStatus::Pending).await?,
        running: queue.count_by_status(JobStatus::Running).await?,
        success: queue.count_by_status(JobStatus::Success).await?,
        failure: queue.count_by_status(JobStatus::Failure).await?,
        active: queue.active_count().await?,
    })
}

/// Replace pending enrichment jobs with one per unenriched book
pub async fn cmd_enqueue_enrichment(queue: &JobQueue) -> Result<u64> {
    let count = queue.enqueue_enrichment_jobs().await?;
    info!("Queued {} enrichment job(s)", count);
    Ok(count)
}

/// Replace pending feed-sync jobs with one per list
pub async fn cmd_enqueue_feed_syncs(queue: &JobQueue) -> Result<u64> {
    let count = queue.enqueue_feed_sync_jobs().await?;
    info!("Queued {} feed sync job(s)", count);
    Ok(count)
}

pub async fn cmd_run_next(queue: &JobQueue) -> Result<RunOutcome> {
    queue.run_next().await
}

/// Print the job list to console
pub fn print_jobs(jobs: &[JobRecord]) {
    if jobs.is_empty() {
        println!("No jobs queued.");
        return;
    }

    println!("\n⚙️  Jobs\n");
    for job in jobs {
        println!(
            "#{:<5} {:<18} {:<8} {}",
            job.id, job.job_type, job.job_status, job.date_updated
        );
        if let Some(error) = &job.error {
            println!("       ✗ {}", error);
        }
    }
}

pub fn print_job_counts(counts: &JobCounts) {
    println!("Pending: {}", counts.pending);
    println!("Running: {}", counts.running);
    println!("Succeeded: {}", counts.success);
    println!("Failed: {}", counts.failure);
    println!("Active: {}", counts.active);
}

pub fn print_run_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Idle => println!("No pending jobs."),
        RunOutcome::Succeeded { id } => println!("✓ Job {} succeeded", id),
        RunOutcome::Failed { id, error } => println!("✗ Job {} failed: {}", id, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{feed_book, setup_test_db};
    use crate::jobs::tests::FakeLookup;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_counts_follow_queue_progress() {
        let (catalog, _tmp) = setup_test_db().await;
        catalog
            .upsert_books_from_feed(&[feed_book("a", "Alpha"), feed_book("b", "Beta")])
            .await
            .unwrap();
        let queue = JobQueue::new(catalog, Arc::new(FakeLookup::new(&[("Alpha", Some("1"))])));

        assert_eq!(cmd_enqueue_enrichment(&queue).await.unwrap(), 2);
        let counts = cmd_jobs_count(&queue).await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.active, 2);

        cmd_run_next(&queue).await.unwrap();
        cmd_run_next(&queue).await.unwrap();
        assert_eq!(cmd_run_next(&queue).await.unwrap(), RunOutcome::Idle);

        let counts = cmd_jobs_count(&queue).await.unwrap();
        assert_eq!(counts.success, 1);
        assert_eq!(counts.failure, 1);
        assert_eq!(counts.active, 0);

        let jobs = cmd_jobs_list(&queue).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs.iter().filter(|j| j.error.is_some()).count(), 1);
    }
}
