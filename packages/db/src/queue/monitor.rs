//! Monitor for the document-backed queue.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;

use super::PersistentJobQueueMonitor;
use crate::connection::{Database, DbError, ensure_not_empty};
use crate::repositories::QueueRepository;

/// Reports the configured queues plus every queue name found in the store.
pub struct DocumentQueueMonitor {
    db: Database,
    configured: Vec<String>,
    cache_ttl: Duration,
    cache: Mutex<Option<(Instant, Vec<String>)>>,
}

impl DocumentQueueMonitor {
    pub fn new(db: Database, configured: Vec<String>, cache_ttl: Duration) -> Self {
        Self {
            db,
            configured,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Vec<String>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.cache_ttl)
            .map(|(_, names)| names.clone())
    }

    pub async fn queue_names(&self) -> Result<Vec<String>, DbError> {
        if let Some(names) = self.cached() {
            return Ok(names);
        }

        let discovered = QueueRepository::distinct_names(&self.db).await?;
        let names: Vec<String> = self
            .configured
            .iter()
            .cloned()
            .chain(discovered)
            .filter(|name| !name.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), names.clone()));
        Ok(names)
    }
}

impl PersistentJobQueueMonitor for DocumentQueueMonitor {
    fn queues(&self) -> BoxFuture<'_, Result<Vec<String>, DbError>> {
        Box::pin(self.queue_names())
    }

    fn enqueued_count<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<u64, DbError>> {
        Box::pin(async move {
            ensure_not_empty(queue, "queue")?;
            QueueRepository::count_visible(&self.db, queue).await
        })
    }

    fn enqueued_job_ids<'a>(
        &'a self,
        queue: &'a str,
        from: usize,
        per_page: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, DbError>> {
        Box::pin(async move {
            ensure_not_empty(queue, "queue")?;
            let entries = QueueRepository::list_visible(&self.db, queue, from, per_page).await?;
            Ok(entries.into_iter().map(|entry| entry.job_id).collect())
        })
    }
}
