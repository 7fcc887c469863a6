use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};
use db::repositories::CounterRepository;
use db::{DbError, ensure_not_empty};
use jobstore_core::{daily_stats_key, hourly_stats_key, now};

use super::MonitoringApi;

/// Bucket size of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Seven calendar days, today included.
    Daily,
    /// Twenty-four hours, the current one included.
    Hourly,
}

impl Granularity {
    pub fn bucket_count(self) -> i64 {
        match self {
            Granularity::Daily => 7,
            Granularity::Hourly => 24,
        }
    }

    /// Start of every bucket ending with the one holding `now`, oldest first.
    pub fn buckets(self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let (current, step) = match self {
            Granularity::Daily => (midnight, TimeDelta::days(1)),
            Granularity::Hourly => (midnight + TimeDelta::hours(i64::from(now.hour())), TimeDelta::hours(1)),
        };

        (0..self.bucket_count())
            .rev()
            .map(|back| current - step * back as i32)
            .collect()
    }

    /// Counter key of the bucket starting at `at`.
    pub fn key(self, stat: &str, at: DateTime<Utc>) -> String {
        match self {
            Granularity::Daily => daily_stats_key(stat, at),
            Granularity::Hourly => hourly_stats_key(stat, at),
        }
    }
}

impl MonitoringApi {
    /// Succeeded jobs per day over the last week.
    pub async fn succeeded_by_dates_count(&self) -> Result<BTreeMap<DateTime<Utc>, i64>, DbError> {
        self.timeline_stats("succeeded", Granularity::Daily, now()).await
    }

    /// Failed jobs per day over the last week.
    pub async fn failed_by_dates_count(&self) -> Result<BTreeMap<DateTime<Utc>, i64>, DbError> {
        self.timeline_stats("failed", Granularity::Daily, now()).await
    }

    /// Succeeded jobs per hour over the last day.
    pub async fn hourly_succeeded_jobs(&self) -> Result<BTreeMap<DateTime<Utc>, i64>, DbError> {
        self.timeline_stats("succeeded", Granularity::Hourly, now()).await
    }

    /// Failed jobs per hour over the last day.
    pub async fn hourly_failed_jobs(&self) -> Result<BTreeMap<DateTime<Utc>, i64>, DbError> {
        self.timeline_stats("failed", Granularity::Hourly, now()).await
    }

    /// Counter totals of `stat` per bucket going back from `now`.
    ///
    /// Always holds one entry per bucket; buckets without a counter are 0.
    pub async fn timeline_stats(
        &self,
        stat: &str,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, i64>, DbError> {
        ensure_not_empty(stat, "stat")?;

        let buckets: Vec<(DateTime<Utc>, String)> = granularity
            .buckets(now)
            .into_iter()
            .map(|at| (at, granularity.key(stat, at)))
            .collect();

        let keys = buckets.iter().map(|(_, key)| key.clone()).collect();
        let totals = CounterRepository::sums(&self.db, keys).await?;

        Ok(buckets
            .into_iter()
            .map(|(at, key)| (at, totals.get(&key).copied().unwrap_or(0)))
            .collect())
    }
}
