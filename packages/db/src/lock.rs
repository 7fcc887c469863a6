//! Scoped distributed locks.

use std::time::Duration;

use jobstore_core::{Lock, new_document_id, now};
use tokio::time::Instant;

use crate::connection::{Database, DbError, ensure_not_empty};
use crate::repositories::LockRepository;

/// Delay between two acquisition attempts.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// A held advisory lock.
///
/// Release it with [`DistributedLock::release`]. A guard dropped without being
/// released deletes the lock in the background; if the process dies first,
/// the lock TTL frees it.
pub struct DistributedLock {
    db: Database,
    resource: String,
    owner: String,
    released: bool,
}

impl DistributedLock {
    /// Acquire `resource`, waiting up to `timeout`.
    ///
    /// Fails with [`DbError::LockTimeout`] when the lock stays taken.
    pub async fn acquire(
        db: &Database,
        resource: &str,
        timeout: Duration,
        ttl: Duration,
    ) -> Result<Self, DbError> {
        ensure_not_empty(resource, "resource")?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DbError::InvalidArgument(format!("lock ttl out of range: {e}")))?;
        let owner = new_document_id();
        let deadline = Instant::now() + timeout;

        loop {
            LockRepository::delete_expired(db, resource, now()).await?;

            if LockRepository::try_create(db, Lock::new(resource, owner.clone(), ttl)).await? {
                tracing::debug!("Acquired lock {}", resource);
                return Ok(Self {
                    db: db.clone(),
                    resource: resource.to_string(),
                    owner,
                    released: false,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DbError::LockTimeout {
                    resource: resource.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(remaining.min(RETRY_DELAY)).await;
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Release the lock now.
    pub async fn release(mut self) -> Result<(), DbError> {
        self.released = true;
        LockRepository::release(&self.db, &self.resource, &self.owner).await?;
        tracing::debug!("Released lock {}", self.resource);
        Ok(())
    }
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Lock {} dropped outside a runtime; left to expire", self.resource);
            return;
        };

        let db = self.db.clone();
        let resource = std::mem::take(&mut self.resource);
        let owner = std::mem::take(&mut self.owner);
        handle.spawn(async move {
            if let Err(e) = LockRepository::release(&db, &resource, &owner).await {
                tracing::warn!("Failed to release lock {}: {}", resource, e);
            }
        });
    }
}
