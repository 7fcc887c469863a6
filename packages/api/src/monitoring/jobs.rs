use std::collections::HashMap;

use chrono::{DateTime, Utc};
use db::DbError;
use db::repositories::{JobRepository, StateRepository};
use jobstore_core::dto::{
    DeletedJobDto, FailedJobDto, JobList, JobListEntry, ProcessingJobDto, ScheduledJobDto,
    SucceededJobDto, deserialize_date_time,
};
use jobstore_core::{JobInvocation, State, states};

use super::{MonitoringApi, invocation_of};

impl MonitoringApi {
    pub async fn processing_jobs(&self, from: usize, count: usize) -> Result<JobList<ProcessingJobDto>, DbError> {
        self.jobs_in_state(states::PROCESSING, from, count, |state, job| ProcessingJobDto {
            job,
            server_id: data(state, "ServerId").or_else(|| data(state, "ServerName")),
            started_at: date(state, "StartedAt"),
        })
        .await
    }

    pub async fn scheduled_jobs(&self, from: usize, count: usize) -> Result<JobList<ScheduledJobDto>, DbError> {
        self.jobs_in_state(states::SCHEDULED, from, count, |state, job| ScheduledJobDto {
            job,
            enqueue_at: date(state, "EnqueueAt"),
            scheduled_at: date(state, "ScheduledAt"),
        })
        .await
    }

    pub async fn succeeded_jobs(&self, from: usize, count: usize) -> Result<JobList<SucceededJobDto>, DbError> {
        self.jobs_in_state(states::SUCCEEDED, from, count, |state, job| SucceededJobDto {
            job,
            result: data(state, "Result"),
            total_duration: millis(state, "PerformanceDuration")
                .zip(millis(state, "Latency"))
                .map(|(performance, latency)| performance + latency),
            succeeded_at: date(state, "SucceededAt"),
        })
        .await
    }

    pub async fn failed_jobs(&self, from: usize, count: usize) -> Result<JobList<FailedJobDto>, DbError> {
        self.jobs_in_state(states::FAILED, from, count, |state, job| FailedJobDto {
            job,
            reason: state.reason.clone(),
            failed_at: date(state, "FailedAt"),
            exception_type: data(state, "ExceptionType"),
            exception_message: data(state, "ExceptionMessage"),
            exception_details: data(state, "ExceptionDetails"),
        })
        .await
    }

    pub async fn deleted_jobs(&self, from: usize, count: usize) -> Result<JobList<DeletedJobDto>, DbError> {
        self.jobs_in_state(states::DELETED, from, count, |state, job| DeletedJobDto {
            job,
            deleted_at: date(state, "DeletedAt"),
        })
        .await
    }

    /// A page of jobs currently in `state_name`, newest first, each joined to
    /// its current state.
    async fn jobs_in_state<T, F>(
        &self,
        state_name: &str,
        from: usize,
        count: usize,
        select: F,
    ) -> Result<JobList<T>, DbError>
    where
        F: Fn(&State, Option<JobInvocation>) -> T,
    {
        let jobs = JobRepository::list_in_state(&self.db, state_name, from, count).await?;

        let state_ids = jobs.iter().filter_map(|job| job.state_id.clone()).collect();
        let current: HashMap<String, State> = StateRepository::get_many(&self.db, state_ids)
            .await?
            .into_iter()
            .map(|state| (state.id.clone(), state))
            .collect();

        Ok(jobs
            .into_iter()
            .filter_map(|job| {
                let Some(state) = job.state_id.as_ref().and_then(|id| current.get(id)) else {
                    tracing::debug!("Current state of job {} is missing; skipped", job.id);
                    return None;
                };
                Some(JobListEntry {
                    dto: select(state, invocation_of(&job)),
                    job_id: job.id,
                })
            })
            .collect())
    }
}

fn data(state: &State, key: &str) -> Option<String> {
    state.data.get(key).cloned()
}

fn date(state: &State, key: &str) -> Option<DateTime<Utc>> {
    state.data.get(key).and_then(|value| deserialize_date_time(value))
}

fn millis(state: &State, key: &str) -> Option<i64> {
    state.data.get(key).and_then(|value| value.trim().parse().ok())
}
