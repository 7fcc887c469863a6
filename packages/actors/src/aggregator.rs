//! Counters aggregator: folds raw counters into one aggregate per key.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use db::repositories::CounterRepository;
use db::{Database, DbError, DistributedLock, StorageOptions};

use crate::messages::SweepKind;
use crate::sweep::{Sweep, SweepFuture};

/// Lock serializing aggregation across processes.
pub const AGGREGATOR_LOCK: &str = "locks:counters:aggregate";

/// How long a sweep waits for another process to finish aggregating.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct KeyBatch {
    ids: Vec<String>,
    expire_on: Option<DateTime<Utc>>,
}

/// Fold every raw counter into its key's aggregate.
///
/// Only raw counters read by this call are deleted; counters written while it
/// runs are left for the next sweep. Returns how many raw counters were folded.
pub async fn aggregate_counters(db: &Database, options: &StorageOptions) -> Result<u64, DbError> {
    let lock = DistributedLock::acquire(db, AGGREGATOR_LOCK, LOCK_TIMEOUT, options.lock_ttl).await?;

    let result = fold_raw_counters(db, options.sweep_batch_size.max(1)).await;

    if let Err(e) = lock.release().await {
        tracing::warn!("Failed to release {}: {}", AGGREGATOR_LOCK, e);
    }
    result
}

async fn fold_raw_counters(db: &Database, batch_size: usize) -> Result<u64, DbError> {
    let mut folded = 0;

    loop {
        let snapshot = CounterRepository::raw_snapshot(db, batch_size).await?;
        if snapshot.is_empty() {
            break;
        }
        let full = snapshot.len() == batch_size;

        let mut by_key: BTreeMap<String, KeyBatch> = BTreeMap::new();
        for counter in snapshot {
            let batch = by_key.entry(counter.key).or_default();
            batch.ids.push(counter.id);
            batch.expire_on = batch.expire_on.max(counter.expire_on);
        }

        for (key, batch) in by_key {
            let count = batch.ids.len() as u64;
            CounterRepository::fold(db, &key, batch.ids, batch.expire_on).await?;
            tracing::debug!("Folded {} raw counters into {}", count, key);
            folded += count;
        }

        if !full {
            break;
        }
    }

    Ok(folded)
}

/// The aggregation sweep.
pub struct CountersAggregator;

impl Sweep for CountersAggregator {
    fn kind(&self) -> SweepKind {
        SweepKind::CountersAggregation
    }

    fn interval(&self, options: &StorageOptions) -> Duration {
        options.counters_aggregate_interval
    }

    fn run<'a>(&'a self, db: &'a Database, options: &'a StorageOptions) -> SweepFuture<'a> {
        Box::pin(aggregate_counters(db, options))
    }
}
