//! Job queues and the registry mapping queue names to their providers.
//!
//! The traits here are object safe (`BoxFuture` returns) so storage users can
//! plug in their own queue implementation per queue name.

mod job_queue;
mod monitor;
mod provider;
mod registry;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::DbError;

pub use job_queue::{DocumentFetchedJob, DocumentJobQueue};
pub use monitor::DocumentQueueMonitor;
pub use provider::DocumentQueueProvider;
pub use registry::QueueProviderRegistry;

/// A leased queue entry.
///
/// Settle it with `complete` or `requeue`. An unsettled lease is requeued when
/// dropped.
pub trait FetchedJob: Send {
    fn job_id(&self) -> &str;

    fn queue(&self) -> &str;

    /// Remove the entry for good.
    fn complete(self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>>;

    /// Make the entry visible to fetchers again.
    fn requeue(self: Box<Self>) -> BoxFuture<'static, Result<(), DbError>>;
}

/// Enqueue and fetch side of a queue implementation.
pub trait PersistentJobQueue: Send + Sync {
    fn enqueue<'a>(&'a self, queue: &'a str, job_id: &'a str) -> BoxFuture<'a, Result<(), DbError>>;

    /// Wait for the oldest visible entry among `queues` and lease it.
    ///
    /// Resolves to `None` once `cancel` fires.
    fn dequeue<'a>(
        &'a self,
        queues: &'a [String],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Box<dyn FetchedJob>>, DbError>>;
}

/// Read side of a queue implementation, used by the monitoring API.
pub trait PersistentJobQueueMonitor: Send + Sync {
    /// Names of the queues this monitor knows about.
    fn queues(&self) -> BoxFuture<'_, Result<Vec<String>, DbError>>;

    /// Entries waiting to be fetched.
    fn enqueued_count<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<u64, DbError>>;

    /// Job ids of waiting entries, oldest first.
    fn enqueued_job_ids<'a>(
        &'a self,
        queue: &'a str,
        from: usize,
        per_page: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, DbError>>;
}

/// Factory for the queue and monitor serving a set of queue names.
pub trait JobQueueProvider: Send + Sync {
    fn job_queue(&self) -> Arc<dyn PersistentJobQueue>;

    fn monitor(&self) -> Arc<dyn PersistentJobQueueMonitor>;
}
