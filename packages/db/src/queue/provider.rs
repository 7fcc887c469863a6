use std::sync::Arc;

use super::{DocumentJobQueue, DocumentQueueMonitor, JobQueueProvider, PersistentJobQueue, PersistentJobQueueMonitor};
use crate::connection::Database;
use crate::options::StorageOptions;

/// Default provider: queues stored as documents next to the jobs.
pub struct DocumentQueueProvider {
    queue: Arc<DocumentJobQueue>,
    monitor: Arc<DocumentQueueMonitor>,
}

impl DocumentQueueProvider {
    pub fn new(db: Database, options: &StorageOptions) -> Self {
        Self {
            queue: Arc::new(DocumentJobQueue::new(db.clone(), options.queue_poll_interval)),
            monitor: Arc::new(DocumentQueueMonitor::new(
                db,
                options.queues.clone(),
                options.queue_cache_ttl,
            )),
        }
    }
}

impl JobQueueProvider for DocumentQueueProvider {
    fn job_queue(&self) -> Arc<dyn PersistentJobQueue> {
        self.queue.clone()
    }

    fn monitor(&self) -> Arc<dyn PersistentJobQueueMonitor> {
        self.monitor.clone()
    }
}
