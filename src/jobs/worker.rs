//! Polling worker for the job queue
//!
//! One job runs at a time: each poll awaits `run_next` to completion before the next
//! sleep starts, so jobs never overlap.

use super::{JobQueue, RunOutcome};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Background worker that drains the job queue on a fixed interval
pub struct JobWorker {
    queue: JobQueue,
    poll_interval: Duration,
}

impl JobWorker {
    pub fn new(queue: JobQueue, poll_interval: Duration) -> Self {
        Self {
            queue,
            poll_interval,
        }
    }

    /// Run a single poll. Storage errors are logged and reported as idle.
    pub async fn tick(&self) -> RunOutcome {
        match self.queue.run_next().await {
            Ok(outcome) => {
                if outcome == RunOutcome::Idle {
                    debug!("Job queue is empty");
                }
                outcome
            }
            Err(e) => {
                error!("Error in worker loop: {}", e);
                RunOutcome::Idle
            }
        }
    }

    /// Poll until `token` is cancelled. A job in flight finishes before the loop exits.
    pub async fn run(self, token: CancellationToken) {
        info!(
            "Background worker started (poll every {:?})",
            self.poll_interval
        );
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            self.tick().await;
        }
        info!("Background worker stopped");
    }

    /// Run the worker on a tokio task
    pub fn spawn(self) -> WorkerHandle {
        let token = CancellationToken::new();
        let handle = tokio::spawn(self.run(token.clone()));
        WorkerHandle { token, handle }
    }
}

/// Handle to a spawned worker
pub struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Token that stops the worker when cancelled
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request a stop and wait for the current job to finish
    pub async fn stop(self) {
        info!("Background worker stop requested");
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!("Background worker task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{feed_book, setup_test_db};
    use crate::jobs::tests::FakeLookup;
    use crate::jobs::JobStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tick_runs_one_job() {
        let (catalog, _tmp) = setup_test_db().await;
        catalog
            .upsert_books_from_feed(&[feed_book("a", "Alpha"), feed_book("b", "Beta")])
            .await
            .unwrap();
        let lookup = FakeLookup::new(&[("Alpha", Some("1")), ("Beta", Some("2"))]);
        let queue = JobQueue::new(catalog, Arc::new(lookup));
        queue.enqueue_enrichment_jobs().await.unwrap();

        let worker = JobWorker::new(queue.clone(), Duration::from_millis(10));
        assert!(matches!(worker.tick().await, RunOutcome::Succeeded { .. }));
        assert_eq!(queue.count_by_status(JobStatus::Pending).await.unwrap(), 1);
        assert!(matches!(worker.tick().await, RunOutcome::Succeeded { .. }));
        assert_eq!(worker.tick().await, RunOutcome::Idle);
    }

    #[tokio::test]
    async fn test_spawned_worker_drains_queue_and_stops() {
        let (catalog, _tmp) = setup_test_db().await;
        catalog
            .upsert_books_from_feed(&[
                feed_book("a", "Alpha"),
                feed_book("b", "Beta"),
                feed_book("c", "Gamma"),
            ])
            .await
            .unwrap();
        let lookup = FakeLookup::new(&[("Alpha", Some("1")), ("Gamma", Some("3"))]);
        let queue = JobQueue::new(catalog, Arc::new(lookup));
        queue.enqueue_enrichment_jobs().await.unwrap();

        let handle = JobWorker::new(queue.clone(), Duration::from_millis(5)).spawn();

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while queue.active_count().await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(drained.is_ok());

        handle.stop().await;
        assert_eq!(queue.count_by_status(JobStatus::Success).await.unwrap(), 2);
        assert_eq!(queue.count_by_status(JobStatus::Failure).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_first_poll() {
        let (catalog, _tmp) = setup_test_db().await;
        let queue = JobQueue::new(catalog, Arc::new(FakeLookup::new(&[])));
        let handle = JobWorker::new(queue, Duration::from_secs(3600)).spawn();
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
    }
}
