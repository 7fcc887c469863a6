//! Document-backed job queue with polling fetch.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use jobstore_core::{QueueEntry, new_document_id, now};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{FetchedJob, PersistentJobQueue};
use crate::connection::{Database, DbError, ensure_not_empty};
use crate::repositories::QueueRepository;

/// Consecutive failed claim attempts tolerated before the error is returned.
const MAX_CLAIM_RETRIES: u32 = 3;

/// Pause before retrying a claim that failed with a store error.
const CLAIM_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Queue storing one document per entry.
///
/// Fetchers sharing a queue hand entries out one at a time; fetchers in other
/// processes are kept apart by the lease token written with each claim.
pub struct DocumentJobQueue {
    db: Database,
    poll_interval: Duration,
    hand_off: Arc<Mutex<()>>,
}

impl DocumentJobQueue {
    pub fn new(db: Database, poll_interval: Duration) -> Self {
        Self {
            db,
            poll_interval,
            hand_off: Arc::new(Mutex::new(())),
        }
    }

    pub async fn enqueue_entry(&self, queue: &str, job_id: &str) -> Result<QueueEntry, DbError> {
        ensure_not_empty(queue, "queue")?;
        ensure_not_empty(job_id, "job_id")?;

        QueueRepository::insert(&self.db, QueueEntry::new(queue, job_id)).await
    }

    /// Poll until an entry can be leased or `cancel` fires.
    pub async fn dequeue_entry(
        &self,
        queues: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<DocumentFetchedJob>, DbError> {
        if queues.is_empty() {
            return Err(DbError::InvalidArgument("queues must not be empty".into()));
        }
        for queue in queues {
            ensure_not_empty(queue, "queue")?;
        }

        let mut failed_claims = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let polled_at = Instant::now();

            match self.try_claim(queues).await {
                Ok(Some(claimed)) => {
                    tracing::debug!("Fetched job {} from queue {}", claimed.job_id, claimed.name);
                    return Ok(Some(DocumentFetchedJob::new(self.db.clone(), claimed)));
                }
                Ok(None) => {}
                Err(e) if failed_claims < MAX_CLAIM_RETRIES => {
                    failed_claims += 1;
                    tracing::debug!("Claim attempt {} failed, retrying: {}", failed_claims, e);
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(CLAIM_RETRY_DELAY) => {}
                    }
                    continue;
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep_until(polled_at + self.poll_interval) => {}
            }
        }
    }

    /// Lease the oldest visible entry, if any.
    ///
    /// A claim lost to another process moves on to the next visible entry.
    async fn try_claim(&self, queues: &[String]) -> Result<Option<QueueEntry>, DbError> {
        let _hand_off = self.hand_off.lock().await;

        while let Some(entry) = QueueRepository::oldest_visible(&self.db, queues.to_vec()).await? {
            let lease = new_document_id();
            if let Some(claimed) = QueueRepository::claim(&self.db, &entry.id, &lease, now()).await? {
                return Ok(Some(claimed));
            }
            tracing::debug!("Queue entry {} was claimed elsewhere", entry.id);
        }

        Ok(None)
    }
}

impl PersistentJobQueue for DocumentJobQueue {
    fn enqueue<'a>(&'a self, queue: &'a str, job_id: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move {
            self.enqueue_entry(queue, job_id).await?;
            Ok(())
        })
    }

    fn dequeue<'a>(
        &'a self,
        queues: &'a [String],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Box<dyn FetchedJob>>, DbError>> {
        Box::pin(async move {
            let fetched = self.dequeue_entry(queues, cancel).await?;
            Ok(fetched.map(|job| Box::new(job) as Box<dyn FetchedJob>))
        })
    }
}

/// Lease on a queue-entry document.
pub struct DocumentFetchedJob {
    db: Database,
    entry_id: String,
    job_id: String,
    queue: String,
    settled: bool,
}

impl DocumentFetchedJob {
    fn new(db: Database, entry: QueueEntry) -> Self {
        Self {
            db,
            entry_id: entry.id,
            job_id: entry.job_id,
            queue: entry.name,
            settled: false,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }
}

impl FetchedJob for DocumentFetchedJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn queue(&self) -> &str {
        &self.queue
    }

    fn complete(mut self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>> {
        self.settled = true;
        Box::pin(async move { QueueRepository::delete(&self.db, &self.entry_id).await })
    }

    fn requeue(mut self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>> {
        self.settled = true;
        Box::pin(async move { QueueRepository::requeue(&self.db, &self.entry_id).await })
    }
}

impl Drop for DocumentFetchedJob {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Lease on job {} dropped outside a runtime", self.job_id);
            return;
        };

        let db = self.db.clone();
        let entry_id = std::mem::take(&mut self.entry_id);
        handle.spawn(async move {
            if let Err(e) = QueueRepository::requeue(&db, &entry_id).await {
                tracing::warn!("Failed to requeue entry {}: {}", entry_id, e);
            }
        });
    }
}
