use std::collections::HashMap;

use db::DbError;
use db::repositories::JobRepository;
use jobstore_core::dto::{EnqueuedJobDto, FetchedJobDto, JobList, JobListEntry, QueueWithTopEnqueuedJobs};
use jobstore_core::{Job, states};

use super::{MonitoringApi, invocation_of};

/// How many waiting jobs `queues()` shows per queue.
const TOP_JOBS: usize = 5;

impl MonitoringApi {
    /// Every known queue with its backlog and oldest waiting jobs, by name.
    ///
    /// Fetched entries are invisible rather than tracked, so `fetched` is
    /// always zero.
    pub async fn queues(&self) -> Result<Vec<QueueWithTopEnqueuedJobs>, DbError> {
        let mut result = Vec::new();

        for name in self.queue_names().await? {
            let monitor = self.queues.get_provider(&name)?.monitor();
            let length = monitor.enqueued_count(&name).await?;
            let job_ids = monitor.enqueued_job_ids(&name, 0, TOP_JOBS).await?;

            result.push(QueueWithTopEnqueuedJobs {
                first_jobs: self.enqueued_list(job_ids).await?,
                name,
                length,
                fetched: 0,
            });
        }

        Ok(result)
    }

    /// Waiting jobs of a queue, oldest first.
    pub async fn enqueued_jobs(
        &self,
        queue: &str,
        from: usize,
        per_page: usize,
    ) -> Result<JobList<EnqueuedJobDto>, DbError> {
        let job_ids = self.queue_job_ids(queue, from, per_page).await?;
        self.enqueued_list(job_ids).await
    }

    /// Mirrors [`MonitoringApi::enqueued_jobs`]: in-flight entries are not
    /// tracked separately.
    pub async fn fetched_jobs(
        &self,
        queue: &str,
        from: usize,
        per_page: usize,
    ) -> Result<JobList<FetchedJobDto>, DbError> {
        let job_ids = self.queue_job_ids(queue, from, per_page).await?;
        Ok(self
            .jobs_by_id(job_ids)
            .await?
            .into_iter()
            .map(|job| JobListEntry {
                dto: FetchedJobDto {
                    job: invocation_of(&job),
                    state: job.state_name,
                },
                job_id: job.id,
            })
            .collect())
    }

    /// Entries waiting to be fetched from `queue`.
    pub async fn enqueued_count(&self, queue: &str) -> Result<u64, DbError> {
        let monitor = self.queues.get_provider(queue)?.monitor();
        monitor.enqueued_count(queue).await
    }

    /// Same value as [`MonitoringApi::enqueued_count`].
    pub async fn fetched_count(&self, queue: &str) -> Result<u64, DbError> {
        self.enqueued_count(queue).await
    }

    async fn queue_job_ids(&self, queue: &str, from: usize, per_page: usize) -> Result<Vec<String>, DbError> {
        let monitor = self.queues.get_provider(queue)?.monitor();
        monitor.enqueued_job_ids(queue, from, per_page).await
    }

    async fn enqueued_list(&self, job_ids: Vec<String>) -> Result<JobList<EnqueuedJobDto>, DbError> {
        Ok(self
            .jobs_by_id(job_ids)
            .await?
            .into_iter()
            .map(|job| JobListEntry {
                dto: EnqueuedJobDto {
                    job: invocation_of(&job),
                    in_enqueued_state: job.state_name.as_deref() == Some(states::ENQUEUED),
                    state: job.state_name,
                },
                job_id: job.id,
            })
            .collect())
    }

    /// Load jobs keeping the order of `job_ids`; ids without a job are dropped.
    async fn jobs_by_id(&self, job_ids: Vec<String>) -> Result<Vec<Job>, DbError> {
        let jobs: HashMap<String, Job> = JobRepository::get_many(&self.db, job_ids.clone())
            .await?
            .into_iter()
            .map(|job| (job.id.clone(), job))
            .collect();

        Ok(job_ids
            .iter()
            .filter_map(|id| {
                let job = jobs.get(id).cloned();
                if job.is_none() {
                    tracing::debug!("Queued job {} no longer exists; skipped", id);
                }
                job
            })
            .collect())
    }
}
