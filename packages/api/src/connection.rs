//! Read/write surface used by job processing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use db::queue::{FetchedJob, QueueProviderRegistry};
use db::repositories::{
    CounterRepository, HashRepository, JobRepository, ServerRepository, SetRepository,
    StateRepository,
};
use db::{Database, DbError, DistributedLock, StorageOptions, ensure_not_empty};
use jobstore_core::{
    Counter, InvocationData, Job, JobInvocation, JobState, Server, ServerContext, SetEntry, State,
    now,
};
use tokio_util::sync::CancellationToken;

/// A job as seen by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    /// `None` when the stored invocation could not be decoded; see `load_error`.
    pub job: Option<JobInvocation>,
    pub load_error: Option<String>,
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The current state of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct StateData {
    pub name: String,
    pub reason: Option<String>,
    pub data: HashMap<String, String>,
}

/// A handle for reading and writing storage documents.
///
/// Cloning is cheap; every clone shares the same client.
#[derive(Clone)]
pub struct StorageConnection {
    db: Database,
    options: Arc<StorageOptions>,
    queues: Arc<QueueProviderRegistry>,
}

impl StorageConnection {
    pub(crate) fn new(
        db: Database,
        options: Arc<StorageOptions>,
        queues: Arc<QueueProviderRegistry>,
    ) -> Self {
        Self { db, options, queues }
    }

    // Jobs

    /// Create a job that is kept until it is explicitly expired.
    pub async fn create_job(
        &self,
        invocation: InvocationData,
        parameters: HashMap<String, String>,
    ) -> Result<String, DbError> {
        let job = JobRepository::create(&self.db, Job::new(invocation, parameters)).await?;
        tracing::debug!("Created job {}", job.id);
        Ok(job.id)
    }

    /// Create a job that expires after `expire_in` unless it is persisted.
    pub async fn create_expired_job(
        &self,
        invocation: InvocationData,
        parameters: HashMap<String, String>,
        expire_in: Duration,
    ) -> Result<String, DbError> {
        let job = Job::new(invocation, parameters).with_expire_on(expires_at(expire_in)?);
        let job = JobRepository::create(&self.db, job).await?;
        tracing::debug!("Created job {} expiring at {:?}", job.id, job.expire_on);
        Ok(job.id)
    }

    pub async fn get_job_data(&self, job_id: &str) -> Result<Option<JobData>, DbError> {
        ensure_not_empty(job_id, "job id")?;

        let Some(job) = JobRepository::get(&self.db, job_id).await? else {
            return Ok(None);
        };

        let (invocation, load_error) = match job.invocation().deserialize() {
            Ok(invocation) => (Some(invocation), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(Some(JobData {
            job: invocation,
            load_error,
            state: job.state_name,
            created_at: job.created_on,
        }))
    }

    pub async fn get_state_data(&self, job_id: &str) -> Result<Option<StateData>, DbError> {
        ensure_not_empty(job_id, "job id")?;

        let Some(state_id) = JobRepository::get(&self.db, job_id)
            .await?
            .and_then(|job| job.state_id)
        else {
            return Ok(None);
        };

        Ok(StateRepository::get(&self.db, &state_id)
            .await?
            .map(|state| StateData {
                name: state.name,
                reason: state.reason,
                data: state.data,
            }))
    }

    /// Append a state to the job's history and make it the current one.
    ///
    /// Returns `None` when the job does not exist.
    pub async fn set_job_state(&self, job_id: &str, state: JobState) -> Result<Option<State>, DbError> {
        ensure_not_empty(job_id, "job id")?;
        ensure_not_empty(&state.name, "state name")?;

        if JobRepository::get(&self.db, job_id).await?.is_none() {
            return Ok(None);
        }

        let state = JobRepository::append_state(&self.db, State::new(job_id, state)).await?;
        tracing::debug!("Job {} moved to {}", job_id, state.name);
        Ok(Some(state))
    }

    /// Set one job parameter. Returns `false` when the job does not exist.
    pub async fn set_job_parameter(&self, job_id: &str, name: &str, value: &str) -> Result<bool, DbError> {
        ensure_not_empty(job_id, "job id")?;
        ensure_not_empty(name, "parameter name")?;

        let Some(job) = JobRepository::get(&self.db, job_id).await? else {
            return Ok(false);
        };

        let mut parameters = job.parameters;
        parameters.insert(name.to_string(), value.to_string());
        JobRepository::set_parameters(&self.db, job_id, parameters).await
    }

    pub async fn get_job_parameter(&self, job_id: &str, name: &str) -> Result<Option<String>, DbError> {
        ensure_not_empty(job_id, "job id")?;
        ensure_not_empty(name, "parameter name")?;

        Ok(JobRepository::get(&self.db, job_id)
            .await?
            .and_then(|mut job| job.parameters.remove(name)))
    }

    /// Expire the job and its states after `expire_in`.
    pub async fn expire_job(&self, job_id: &str, expire_in: Duration) -> Result<(), DbError> {
        ensure_not_empty(job_id, "job id")?;
        JobRepository::set_expire_on(&self.db, job_id, Some(expires_at(expire_in)?)).await
    }

    /// Keep the job and its states forever.
    pub async fn persist_job(&self, job_id: &str) -> Result<(), DbError> {
        ensure_not_empty(job_id, "job id")?;
        JobRepository::set_expire_on(&self.db, job_id, None).await
    }

    // Queues

    pub async fn enqueue(&self, queue: &str, job_id: &str) -> Result<(), DbError> {
        ensure_not_empty(job_id, "job id")?;
        let provider = self.queues.get_provider(queue)?;
        provider.job_queue().enqueue(queue, job_id).await
    }

    /// Wait for the next job on any of `queues` and lease it.
    ///
    /// Resolves to `None` once `cancel` fires. Every queue must be served by
    /// the same provider.
    pub async fn fetch_next_job(
        &self,
        queues: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn FetchedJob>>, DbError> {
        let provider = self.queues.provider_for_all(queues)?;
        let job_queue = provider.job_queue();
        job_queue.dequeue(queues, cancel).await
    }

    // Locks

    /// Acquire an advisory lock on `resource`, waiting up to `timeout`.
    pub async fn acquire_distributed_lock(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<DistributedLock, DbError> {
        DistributedLock::acquire(&self.db, resource, timeout, self.options.lock_ttl).await
    }

    // Counters

    pub async fn increment_counter(&self, key: &str) -> Result<(), DbError> {
        self.add_to_counter(key, 1, None).await
    }

    pub async fn increment_counter_with_expiry(&self, key: &str, expire_in: Duration) -> Result<(), DbError> {
        self.add_to_counter(key, 1, Some(expire_in)).await
    }

    pub async fn decrement_counter(&self, key: &str) -> Result<(), DbError> {
        self.add_to_counter(key, -1, None).await
    }

    pub async fn decrement_counter_with_expiry(&self, key: &str, expire_in: Duration) -> Result<(), DbError> {
        self.add_to_counter(key, -1, Some(expire_in)).await
    }

    async fn add_to_counter(&self, key: &str, value: i64, expire_in: Option<Duration>) -> Result<(), DbError> {
        ensure_not_empty(key, "counter key")?;
        let expire_on = expire_in.map(expires_at).transpose()?;
        CounterRepository::insert_raw(&self.db, Counter::raw(key, value, expire_on)).await?;
        Ok(())
    }

    /// Current value of a counter, whether or not it was aggregated yet.
    pub async fn get_counter(&self, key: &str) -> Result<i64, DbError> {
        ensure_not_empty(key, "counter key")?;
        CounterRepository::sum(&self.db, key).await
    }

    // Sets

    pub async fn add_to_set(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.add_to_set_with_score(key, value, 0.0).await
    }

    /// Add `value` to the set, or update its score if it is already there.
    pub async fn add_to_set_with_score(&self, key: &str, value: &str, score: f64) -> Result<(), DbError> {
        ensure_not_empty(key, "set key")?;
        SetRepository::add(&self.db, SetEntry::new(key, value, score)).await?;
        Ok(())
    }

    pub async fn remove_from_set(&self, key: &str, value: &str) -> Result<bool, DbError> {
        ensure_not_empty(key, "set key")?;
        SetRepository::remove(&self.db, key, value).await
    }

    /// Members of the set, lowest score first.
    pub async fn get_all_items_from_set(&self, key: &str) -> Result<Vec<String>, DbError> {
        ensure_not_empty(key, "set key")?;
        Ok(SetRepository::members(&self.db, key)
            .await?
            .into_iter()
            .map(|entry| entry.value)
            .collect())
    }

    pub async fn get_set_count(&self, key: &str) -> Result<u64, DbError> {
        ensure_not_empty(key, "set key")?;
        SetRepository::count(&self.db, key).await
    }

    /// The member with the lowest score within `[from_score, to_score]`.
    pub async fn get_first_by_lowest_score_from_set(
        &self,
        key: &str,
        from_score: f64,
        to_score: f64,
    ) -> Result<Option<String>, DbError> {
        ensure_not_empty(key, "set key")?;
        if to_score < from_score {
            return Err(DbError::InvalidArgument(
                "the `to_score` value must be higher or equal to the `from_score` value".into(),
            ));
        }

        Ok(SetRepository::first_by_lowest_score(&self.db, key, from_score, to_score)
            .await?
            .map(|entry| entry.value))
    }

    pub async fn expire_set(&self, key: &str, expire_in: Duration) -> Result<(), DbError> {
        ensure_not_empty(key, "set key")?;
        SetRepository::set_expire_on(&self.db, key, Some(expires_at(expire_in)?)).await
    }

    pub async fn persist_set(&self, key: &str) -> Result<(), DbError> {
        ensure_not_empty(key, "set key")?;
        SetRepository::set_expire_on(&self.db, key, None).await
    }

    // Hashes

    pub async fn set_range_in_hash<I>(&self, key: &str, fields: I) -> Result<(), DbError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        ensure_not_empty(key, "hash key")?;
        HashRepository::set_range(&self.db, key, fields).await
    }

    /// Every field of the hash, or `None` when it has none.
    pub async fn get_all_entries_from_hash(&self, key: &str) -> Result<Option<HashMap<String, String>>, DbError> {
        ensure_not_empty(key, "hash key")?;
        let entries = HashRepository::get_all(&self.db, key).await?;
        Ok((!entries.is_empty()).then_some(entries))
    }

    pub async fn get_value_from_hash(&self, key: &str, field: &str) -> Result<Option<String>, DbError> {
        ensure_not_empty(key, "hash key")?;
        ensure_not_empty(field, "hash field")?;
        HashRepository::get_value(&self.db, key, field).await
    }

    /// Delete every field of the hash. Returns how many were removed.
    pub async fn remove_hash(&self, key: &str) -> Result<u64, DbError> {
        ensure_not_empty(key, "hash key")?;
        HashRepository::remove(&self.db, key).await
    }

    // Servers

    pub async fn announce_server(&self, server_id: &str, context: ServerContext) -> Result<(), DbError> {
        ensure_not_empty(server_id, "server id")?;
        ServerRepository::announce(&self.db, Server::new(server_id, context)).await?;
        tracing::info!("Server {} announced", server_id);
        Ok(())
    }

    /// Record a heartbeat. Returns `false` when the server is not registered.
    pub async fn heartbeat(&self, server_id: &str) -> Result<bool, DbError> {
        ensure_not_empty(server_id, "server id")?;
        ServerRepository::heartbeat(&self.db, server_id, now()).await
    }

    pub async fn remove_server(&self, server_id: &str) -> Result<bool, DbError> {
        ensure_not_empty(server_id, "server id")?;
        let removed = ServerRepository::remove(&self.db, server_id).await?;
        if removed {
            tracing::info!("Server {} removed", server_id);
        }
        Ok(removed)
    }

    /// Remove every server whose last heartbeat is older than `timeout`.
    pub async fn remove_timed_out_servers(&self, timeout: Duration) -> Result<u64, DbError> {
        if timeout.is_zero() {
            return Err(DbError::InvalidArgument("the `timeout` value must be positive".into()));
        }

        let cutoff = now() - to_chrono(timeout)?;
        let removed = ServerRepository::remove_stale(&self.db, cutoff).await?;
        if removed > 0 {
            tracing::info!("Removed {} timed out servers", removed);
        }
        Ok(removed)
    }
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration, DbError> {
    chrono::Duration::from_std(duration)
        .map_err(|e| DbError::InvalidArgument(format!("duration out of range: {e}")))
}

fn expires_at(expire_in: Duration) -> Result<DateTime<Utc>, DbError> {
    Ok(now() + to_chrono(expire_in)?)
}
