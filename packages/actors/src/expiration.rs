//! Expiration manager: deletes documents past their `expire_on`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use db::repositories::{DocumentRepository, StateRepository};
use db::{Database, DbError, StorageOptions};
use jobstore_core::{DocumentType, now};

use crate::messages::SweepKind;
use crate::sweep::{Sweep, SweepFuture};

/// Delete every document whose expiry is at or before `now`.
///
/// Documents without an expiry are never touched. States of deleted jobs go
/// with them. Returns how many documents were removed.
pub async fn remove_expired(db: &Database, now: DateTime<Utc>, batch_size: usize) -> Result<u64, DbError> {
    let batch_size = batch_size.max(1);
    let mut removed = 0;

    for document_type in DocumentType::ALL {
        loop {
            let ids = DocumentRepository::expired_ids(db, document_type, now, batch_size).await?;
            if ids.is_empty() {
                break;
            }
            let full = ids.len() == batch_size;

            // Already-deleted ids are skipped, so concurrent sweeps are harmless
            let deleted = DocumentRepository::delete_many(db, document_type, ids).await?;
            let progressed = !deleted.is_empty();
            removed += deleted.len() as u64;

            if document_type == DocumentType::Job {
                removed += StateRepository::delete_for_jobs(db, deleted).await?;
            }

            if !full || !progressed {
                break;
            }
        }
    }

    Ok(removed)
}

/// The expiration sweep.
pub struct ExpirationManager;

impl Sweep for ExpirationManager {
    fn kind(&self) -> SweepKind {
        SweepKind::Expiration
    }

    fn interval(&self, options: &StorageOptions) -> Duration {
        options.expiration_check_interval
    }

    fn run<'a>(&'a self, db: &'a Database, options: &'a StorageOptions) -> SweepFuture<'a> {
        Box::pin(remove_expired(db, now(), options.sweep_batch_size))
    }
}
