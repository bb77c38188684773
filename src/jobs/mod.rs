//! Durable background job queue
//!
//! Jobs live in the `job_queue` table and move `pending -> running -> success|failure`.
//! Failed jobs are terminal; re-seeding creates fresh pending jobs instead.

mod worker;

pub use worker::*;

use crate::catalog::{Catalog, FeedName};
use crate::dates::now_canonical;
use crate::error::{Error, Result};
use crate::feed::FeedImporter;
use crate::scrape::BookLookup;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        };
        f.pad(name)
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failure" => Ok(JobStatus::Failure),
            _ => Err(Error::Validation(format!("Unknown job status: {}", s))),
        }
    }
}

/// Payload of an enrichment job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentPayload {
    pub book_id: i64,
    pub title: String,
    pub author: Option<String>,
}

/// Payload of a feed sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSyncPayload {
    pub feed: FeedName,
}

/// Every kind of work the queue knows how to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTask {
    EnrichmentScrape(EnrichmentPayload),
    FeedSync(FeedSyncPayload),
}

impl JobTask {
    pub const ENRICHMENT_SCRAPE: &'static str = "enrichment_scrape";
    pub const FEED_SYNC: &'static str = "feed_sync";

    /// Value stored in `job_queue.job_type`
    pub fn job_type(&self) -> &'static str {
        match self {
            JobTask::EnrichmentScrape(_) => Self::ENRICHMENT_SCRAPE,
            JobTask::FeedSync(_) => Self::FEED_SYNC,
        }
    }

    pub fn payload_json(&self) -> Result<String> {
        let json = match self {
            JobTask::EnrichmentScrape(payload) => serde_json::to_string(payload)?,
            JobTask::FeedSync(payload) => serde_json::to_string(payload)?,
        };
        Ok(json)
    }

    /// Rebuild a task from its stored type and payload
    pub fn decode(job_type: &str, payload: &str) -> Result<Self> {
        match job_type {
            Self::ENRICHMENT_SCRAPE => {
                Ok(JobTask::EnrichmentScrape(serde_json::from_str(payload)?))
            }
            Self::FEED_SYNC => Ok(JobTask::FeedSync(serde_json::from_str(payload)?)),
            other => Err(Error::Validation(format!("Unknown job type: {}", other))),
        }
    }
}

/// A row of the job queue
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub job_type: String,
    pub job_status: JobStatus,
    pub payload: String,
    pub error: Option<String>,
    pub date_created: String,
    pub date_updated: String,
}

/// Result of one `run_next` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RunOutcome {
    /// Nothing was pending
    Idle,
    Succeeded { id: i64 },
    Failed { id: i64, error: String },
}

/// Job queue over the catalog database
#[derive(Clone)]
pub struct JobQueue {
    catalog: Catalog,
    lookup: Arc<dyn BookLookup>,
    importer: Option<FeedImporter>,
}

impl JobQueue {
    pub fn new(catalog: Catalog, lookup: Arc<dyn BookLookup>) -> Self {
        Self {
            catalog,
            lookup,
            importer: None,
        }
    }

    /// Enable feed sync jobs
    pub fn with_importer(mut self, importer: FeedImporter) -> Self {
        self.importer = Some(importer);
        self
    }

    // ===== Enqueue =====

    /// Add one pending job
    pub async fn enqueue(&self, task: &JobTask) -> Result<i64> {
        let now = now_canonical();
        let result = sqlx::query(
            "INSERT INTO job_queue (job_type, job_status, payload, date_created, date_updated) VALUES (?, 'pending', ?, ?, ?)",
        )
        .bind(task.job_type())
        .bind(task.payload_json()?)
        .bind(&now)
        .bind(&now)
        .execute(self.catalog.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Replace pending jobs of one type with `tasks`, atomically
    async fn replace_pending(&self, job_type: &str, tasks: &[JobTask]) -> Result<u64> {
        let now = now_canonical();
        let mut tx = self.catalog.pool().begin().await?;

        let deleted =
            sqlx::query("DELETE FROM job_queue WHERE job_type = ? AND job_status = 'pending'")
                .bind(job_type)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        for task in tasks {
            sqlx::query(
                "INSERT INTO job_queue (job_type, job_status, payload, date_created, date_updated) VALUES (?, 'pending', ?, ?, ?)",
            )
            .bind(task.job_type())
            .bind(task.payload_json()?)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            "Queued {} {} jobs (replaced {} pending)",
            tasks.len(),
            job_type,
            deleted
        );
        Ok(tasks.len() as u64)
    }

    /// Replace pending enrichment jobs with one per book that has no ISBN, in random order
    pub async fn enqueue_enrichment_jobs(&self) -> Result<u64> {
        let tasks: Vec<JobTask> = self
            .catalog
            .unenriched_books()
            .await?
            .into_iter()
            .map(|book| {
                JobTask::EnrichmentScrape(EnrichmentPayload {
                    book_id: book.id,
                    title: book.title,
                    author: book.author,
                })
            })
            .collect();
        self.replace_pending(JobTask::ENRICHMENT_SCRAPE, &tasks).await
    }

    /// Replace pending feed sync jobs with one per list
    pub async fn enqueue_feed_sync_jobs(&self) -> Result<u64> {
        let tasks: Vec<JobTask> = FeedName::ALL
            .into_iter()
            .map(|feed| JobTask::FeedSync(FeedSyncPayload { feed }))
            .collect();
        self.replace_pending(JobTask::FEED_SYNC, &tasks).await
    }

    // ===== Execution =====

    /// Run the oldest pending job to completion.
    ///
    /// Job failures are recorded on the job and reported as `RunOutcome::Failed`;
    /// only storage errors are returned as `Err`.
    pub async fn run_next(&self) -> Result<RunOutcome> {
        let job = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE job_queue SET job_status = 'running', date_updated = ?
            WHERE id = (
                SELECT id FROM job_queue
                WHERE job_status = 'pending'
                ORDER BY date_created ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now_canonical())
        .fetch_optional(self.catalog.pool())
        .await?;

        let Some(job) = job else {
            return Ok(RunOutcome::Idle);
        };

        info!("Processing job {} (type: {})", job.id, job.job_type);

        let result = match JobTask::decode(&job.job_type, &job.payload) {
            Ok(task) => self.execute(&task).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.finish(job.id, JobStatus::Success, None).await?;
                info!("Job {} completed successfully", job.id);
                Ok(RunOutcome::Succeeded { id: job.id })
            }
            Err(e) => {
                let error = e.to_string();
                warn!("Job {} failed: {}", job.id, error);
                self.finish(job.id, JobStatus::Failure, Some(&error)).await?;
                Ok(RunOutcome::Failed { id: job.id, error })
            }
        }
    }

    /// Return jobs left `running` by an interrupted process to `pending`.
    ///
    /// Must run before any worker starts. Handlers are idempotent, so re-running
    /// a half-finished job is safe. Recovered jobs keep their creation time and
    /// therefore run first.
    pub async fn recover_orphaned(&self) -> Result<u64> {
        let recovered = sqlx::query(
            "UPDATE job_queue SET job_status = 'pending', date_updated = ? WHERE job_status = 'running'",
        )
        .bind(now_canonical())
        .execute(self.catalog.pool())
        .await?
        .rows_affected();

        if recovered > 0 {
            warn!("Recovered {} job(s) left running by a previous run", recovered);
        }
        Ok(recovered)
    }

    async fn execute(&self, task: &JobTask) -> Result<()> {
        match task {
            JobTask::EnrichmentScrape(payload) => self.enrich(payload).await,
            JobTask::FeedSync(payload) => {
                let importer = self.importer.as_ref().ok_or_else(|| {
                    Error::Config("feed sync jobs need a feed importer".to_string())
                })?;
                importer.sync_feed(payload.feed).await.map(|_| ())
            }
        }
    }

    async fn enrich(&self, payload: &EnrichmentPayload) -> Result<()> {
        let scraped = self
            .lookup
            .by_title_author(&payload.title, payload.author.as_deref())
            .await?;
        let isbn = scraped
            .isbn
            .clone()
            .ok_or_else(|| Error::scrape(scraped.url.as_str(), "page has no ISBN-10"))?;
        self.catalog
            .apply_enrichment(payload.book_id, &isbn, &scraped)
            .await
    }

    async fn finish(&self, id: i64, status: JobStatus, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE job_queue SET job_status = ?, error = ?, date_updated = ? WHERE id = ?")
            .bind(status)
            .bind(error)
            .bind(now_canonical())
            .bind(id)
            .execute(self.catalog.pool())
            .await?;
        Ok(())
    }

    // ===== Dashboard =====

    /// All jobs, oldest first
    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        let jobs = sqlx::query_as::<_, JobRecord>(
            "SELECT * FROM job_queue ORDER BY date_created ASC, id ASC",
        )
        .fetch_all(self.catalog.pool())
        .await?;
        Ok(jobs)
    }

    pub async fn get(&self, id: i64) -> Result<JobRecord> {
        sqlx::query_as::<_, JobRecord>("SELECT * FROM job_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(self.catalog.pool())
            .await?
            .ok_or(Error::JobNotFound(id))
    }

    /// Number of pending or running jobs
    pub async fn active_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue WHERE job_status IN ('pending', 'running')",
        )
        .fetch_one(self.catalog.pool())
        .await?;
        Ok(count)
    }

    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE job_status = ?")
            .bind(status)
            .fetch_one(self.catalog.pool())
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::tests::{feed_book, setup_test_db};
    use crate::catalog::ScrapedBook;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Lookup that answers from a fixed table keyed by title
    pub(crate) struct FakeLookup {
        books: HashMap<String, ScrapedBook>,
    }

    impl FakeLookup {
        pub(crate) fn new(entries: &[(&str, Option<&str>)]) -> Self {
            let books = entries
                .iter()
                .map(|(title, isbn)| {
                    let book = ScrapedBook {
                        url: format!("https://example.test/book/{}", title),
                        goodreads_id: Some(format!("gr-{}", title)),
                        title: title.to_string(),
                        isbn: isbn.map(str::to_string),
                        ..Default::default()
                    };
                    (title.to_string(), book)
                })
                .collect();
            Self { books }
        }
    }

    #[async_trait]
    impl BookLookup for FakeLookup {
        async fn by_title_author(&self, title: &str, _author: Option<&str>) -> Result<ScrapedBook> {
            self.books
                .get(title)
                .cloned()
                .ok_or_else(|| {
                    Error::scrape(
                        format!("https://example.test/search?q={}", title),
                        "no search result",
                    )
                })
        }

        async fn by_identifier(&self, identifier: &str) -> Result<ScrapedBook> {
            self.books
                .values()
                .find(|b| b.isbn.as_deref() == Some(identifier))
                .cloned()
                .ok_or_else(|| Error::scrape("https://example.test/search", "no search result"))
        }
    }

    async fn seeded_queue(lookup: FakeLookup) -> (JobQueue, Catalog, tempfile::TempDir) {
        let (catalog, tmp) = setup_test_db().await;
        catalog
            .upsert_books_from_feed(&[
                feed_book("a", "Alpha"),
                feed_book("b", "Beta"),
                feed_book("c", "Gamma"),
            ])
            .await
            .unwrap();
        let queue = JobQueue::new(catalog.clone(), Arc::new(lookup));
        (queue, catalog, tmp)
    }

    #[test]
    fn test_unknown_job_type_is_rejected() {
        assert!(matches!(
            JobTask::decode("reticulate_splines", "{}"),
            Err(Error::Validation(_))
        ));
        let task = JobTask::FeedSync(FeedSyncPayload {
            feed: FeedName::ToRead,
        });
        let decoded = JobTask::decode(task.job_type(), &task.payload_json().unwrap()).unwrap();
        assert_eq!(decoded, task);
    }

    #[tokio::test]
    async fn test_enqueue_matches_unenriched_books() {
        let (queue, catalog, _tmp) = seeded_queue(FakeLookup::new(&[])).await;
        let id = catalog.search("Gamma").await.unwrap()[0].id;
        catalog
            .apply_enrichment(
                id,
                "0000000001",
                &ScrapedBook {
                    title: "Gamma".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(queue.enqueue_enrichment_jobs().await.unwrap(), 2);
        assert_eq!(queue.count_by_status(JobStatus::Pending).await.unwrap(), 2);

        // Re-seeding replaces pending jobs instead of stacking them
        assert_eq!(queue.enqueue_enrichment_jobs().await.unwrap(), 2);
        assert_eq!(queue.list().await.unwrap().len(), 2);
        assert_eq!(queue.active_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_next_success_enriches_book() {
        let lookup = FakeLookup::new(&[("Alpha", Some("1111111111"))]);
        let (queue, catalog, _tmp) = seeded_queue(lookup).await;
        let alpha = catalog.search("Alpha").await.unwrap().remove(0);

        let id = queue
            .enqueue(&JobTask::EnrichmentScrape(EnrichmentPayload {
                book_id: alpha.id,
                title: alpha.title.clone(),
                author: alpha.author.clone(),
            }))
            .await
            .unwrap();

        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Succeeded { id });
        assert_eq!(queue.get(id).await.unwrap().job_status, JobStatus::Success);
        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Idle);
        assert_eq!(queue.get(id).await.unwrap().job_status, JobStatus::Success);

        let book = catalog.get_by_id(alpha.id).await.unwrap().unwrap();
        assert_eq!(book.isbn.as_deref(), Some("1111111111"));
        assert_eq!(book.goodreads_id.as_deref(), Some("gr-Alpha"));
        assert!(catalog.cached_scrape("1111111111").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let lookup = FakeLookup::new(&[("Beta", None)]);
        let (queue, _catalog, _tmp) = seeded_queue(lookup).await;
        queue.enqueue_enrichment_jobs().await.unwrap();

        // Every job fails: Alpha and Gamma have no result, Beta has no ISBN
        for _ in 0..3 {
            let outcome = queue.run_next().await.unwrap();
            assert!(matches!(outcome, RunOutcome::Failed { .. }));
        }
        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Idle);

        let jobs = queue.list().await.unwrap();
        assert!(jobs.iter().all(|j| j.job_status == JobStatus::Failure));
        assert!(jobs.iter().all(|j| j.error.is_some()));
        assert_eq!(queue.active_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_jobs_run_in_creation_order() {
        let lookup = FakeLookup::new(&[("Alpha", Some("1")), ("Beta", Some("2"))]);
        let (queue, catalog, _tmp) = seeded_queue(lookup).await;

        let mut ids = Vec::new();
        for title in ["Beta", "Alpha"] {
            let book = catalog.search(title).await.unwrap().remove(0);
            ids.push(
                queue
                    .enqueue(&JobTask::EnrichmentScrape(EnrichmentPayload {
                        book_id: book.id,
                        title: book.title,
                        author: None,
                    }))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Succeeded { id: ids[0] });
        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Succeeded { id: ids[1] });
    }

    async fn mark_running(catalog: &Catalog, id: i64) {
        sqlx::query("UPDATE job_queue SET job_status = 'running' WHERE id = ?")
            .bind(id)
            .execute(catalog.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recover_orphaned_requeues_running_job() {
        let lookup = FakeLookup::new(&[("Alpha", Some("1111111111"))]);
        let (queue, catalog, _tmp) = seeded_queue(lookup).await;
        let alpha = catalog.search("Alpha").await.unwrap().remove(0);
        let id = queue
            .enqueue(&JobTask::EnrichmentScrape(EnrichmentPayload {
                book_id: alpha.id,
                title: alpha.title.clone(),
                author: None,
            }))
            .await
            .unwrap();
        mark_running(&catalog, id).await;

        // A running job is never picked up again on its own
        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Idle);

        assert_eq!(queue.recover_orphaned().await.unwrap(), 1);
        assert_eq!(queue.get(id).await.unwrap().job_status, JobStatus::Pending);
        assert_eq!(queue.run_next().await.unwrap(), RunOutcome::Succeeded { id });
        assert_eq!(queue.active_count().await.unwrap(), 0);
        assert_eq!(queue.recover_orphaned().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recovered_jobs_are_replaced_by_reseed() {
        let lookup = FakeLookup::new(&[
            ("Alpha", Some("1")),
            ("Beta", Some("2")),
            ("Gamma", Some("3")),
        ]);
        let (queue, catalog, _tmp) = seeded_queue(lookup).await;
        queue.enqueue_enrichment_jobs().await.unwrap();
        let first = queue.list().await.unwrap()[0].id;
        mark_running(&catalog, first).await;

        queue.recover_orphaned().await.unwrap();
        assert_eq!(queue.enqueue_enrichment_jobs().await.unwrap(), 3);

        while queue.run_next().await.unwrap() != RunOutcome::Idle {}

        let jobs = queue.list().await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.job_status == JobStatus::Success));
        assert_eq!(queue.active_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feed_sync_without_importer_fails_the_job() {
        let (queue, _catalog, _tmp) = seeded_queue(FakeLookup::new(&[])).await;
        assert_eq!(queue.enqueue_feed_sync_jobs().await.unwrap(), 3);

        let outcome = queue.run_next().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));
        assert_eq!(queue.active_count().await.unwrap(), 2);
    }
}
