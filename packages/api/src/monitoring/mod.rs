//! Read model behind dashboards and the CLI.
//!
//! Every method only reads. The store has no joins, so listings fetch the
//! primary documents first and then load the referenced ones by id; a
//! reference that no longer resolves is skipped instead of failing the view.

mod jobs;
mod queues;
mod timeline;

use std::collections::BTreeSet;
use std::sync::Arc;

use db::queue::QueueProviderRegistry;
use db::repositories::{
    CounterRepository, JobRepository, ServerRepository, SetRepository, StateRepository,
};
use db::{Database, DbError, ensure_not_empty};
use jobstore_core::dto::{JobDetailsDto, ServerDto, StateHistoryDto, StatisticsDto};
use jobstore_core::{DELETED_KEY, Job, JobInvocation, RECURRING_JOBS_SET, SUCCEEDED_KEY, states};

pub use timeline::Granularity;

/// Read-only monitoring views over the storage.
#[derive(Clone)]
pub struct MonitoringApi {
    db: Database,
    queues: Arc<QueueProviderRegistry>,
}

impl MonitoringApi {
    pub(crate) fn new(db: Database, queues: Arc<QueueProviderRegistry>) -> Self {
        Self { db, queues }
    }

    /// Registered servers, most recently started first.
    pub async fn servers(&self) -> Result<Vec<ServerDto>, DbError> {
        Ok(ServerRepository::list(&self.db)
            .await?
            .into_iter()
            .map(|server| ServerDto {
                name: server.server_id,
                heartbeat: server.last_heartbeat,
                queues: server.queues,
                started_at: server.created_on,
                workers_count: server.workers,
            })
            .collect())
    }

    /// A job with its full state history, or `None` if it does not exist.
    pub async fn job_details(&self, job_id: &str) -> Result<Option<JobDetailsDto>, DbError> {
        ensure_not_empty(job_id, "job id")?;

        let Some(job) = JobRepository::get(&self.db, job_id).await? else {
            return Ok(None);
        };

        let history = StateRepository::history(&self.db, job_id)
            .await?
            .into_iter()
            .map(|state| StateHistoryDto {
                state_name: state.name,
                reason: state.reason,
                created_at: state.created_on,
                data: state.data,
            })
            .collect();

        Ok(Some(JobDetailsDto {
            job: invocation_of(&job),
            created_at: job.created_on,
            expire_at: job.expire_on,
            properties: job.parameters,
            history,
        }))
    }

    /// Dashboard totals.
    pub async fn get_statistics(&self) -> Result<StatisticsDto, DbError> {
        let by_state = JobRepository::count_by_state(&self.db).await?;
        let in_state = |name: &str| by_state.get(name).copied().unwrap_or(0) as i64;

        let totals = CounterRepository::sums(
            &self.db,
            vec![SUCCEEDED_KEY.to_string(), DELETED_KEY.to_string()],
        )
        .await?;
        let total = |key: &str| totals.get(key).copied().unwrap_or(0);

        Ok(StatisticsDto {
            enqueued: in_state(states::ENQUEUED),
            failed: in_state(states::FAILED),
            processing: in_state(states::PROCESSING),
            scheduled: in_state(states::SCHEDULED),
            succeeded: total(SUCCEEDED_KEY),
            deleted: total(DELETED_KEY),
            recurring: SetRepository::count(&self.db, RECURRING_JOBS_SET).await? as i64,
            servers: ServerRepository::count(&self.db).await? as i64,
            queues: self.queue_names().await?.len() as i64,
        })
    }

    pub async fn scheduled_count(&self) -> Result<u64, DbError> {
        JobRepository::count_in_state(&self.db, states::SCHEDULED).await
    }

    pub async fn failed_count(&self) -> Result<u64, DbError> {
        JobRepository::count_in_state(&self.db, states::FAILED).await
    }

    pub async fn processing_count(&self) -> Result<u64, DbError> {
        JobRepository::count_in_state(&self.db, states::PROCESSING).await
    }

    pub async fn succeeded_list_count(&self) -> Result<u64, DbError> {
        JobRepository::count_in_state(&self.db, states::SUCCEEDED).await
    }

    pub async fn deleted_list_count(&self) -> Result<u64, DbError> {
        JobRepository::count_in_state(&self.db, states::DELETED).await
    }

    /// Every queue name reported by any provider's monitor.
    async fn queue_names(&self) -> Result<BTreeSet<String>, DbError> {
        let mut names = BTreeSet::new();
        for provider in self.queues.providers() {
            names.extend(provider.monitor().queues().await?);
        }
        Ok(names)
    }
}

/// Decode a job's invocation, logging instead of failing the view.
fn invocation_of(job: &Job) -> Option<JobInvocation> {
    match job.invocation().deserialize() {
        Ok(invocation) => Some(invocation),
        Err(e) => {
            tracing::warn!("Could not load invocation data of job {}: {}", job.id, e);
            None
        }
    }
}
