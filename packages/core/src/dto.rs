//! Read-only projections returned by the monitoring API.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobInvocation;

/// One row of a paginated job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListEntry<T> {
    pub job_id: String,
    #[serde(flatten)]
    pub dto: T,
}

/// A page of job listing rows, in listing order.
pub type JobList<T> = Vec<JobListEntry<T>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueWithTopEnqueuedJobs {
    pub name: String,
    pub length: u64,
    pub fetched: u64,
    pub first_jobs: JobList<EnqueuedJobDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDto {
    pub name: String,
    pub heartbeat: DateTime<Utc>,
    pub queues: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub workers_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateHistoryDto {
    pub state_name: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetailsDto {
    /// `None` when the stored invocation data could not be decoded.
    pub job: Option<JobInvocation>,
    pub created_at: DateTime<Utc>,
    pub expire_at: Option<DateTime<Utc>>,
    pub properties: HashMap<String, String>,
    /// Newest first.
    pub history: Vec<StateHistoryDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsDto {
    pub enqueued: i64,
    pub failed: i64,
    pub processing: i64,
    pub scheduled: i64,
    pub succeeded: i64,
    pub deleted: i64,
    pub recurring: i64,
    pub servers: i64,
    pub queues: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueuedJobDto {
    pub job: Option<JobInvocation>,
    pub state: Option<String>,
    pub in_enqueued_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedJobDto {
    pub job: Option<JobInvocation>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJobDto {
    pub job: Option<JobInvocation>,
    pub server_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJobDto {
    pub job: Option<JobInvocation>,
    pub enqueue_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SucceededJobDto {
    pub job: Option<JobInvocation>,
    pub result: Option<String>,
    /// Performance duration plus latency, in milliseconds.
    pub total_duration: Option<i64>,
    pub succeeded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJobDto {
    pub job: Option<JobInvocation>,
    pub reason: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    pub exception_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedJobDto {
    pub job: Option<JobInvocation>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Format a timestamp for storage in state data.
pub fn serialize_date_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp found in state data.
///
/// Accepts RFC 3339 strings and integer Unix timestamps in seconds.
pub fn deserialize_date_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_time_round_trips_through_state_data() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap();
        assert_eq!(serialize_date_time(at), "2024-03-01T12:00:05.000Z");
        assert_eq!(deserialize_date_time(&serialize_date_time(at)), Some(at));
    }

    #[test]
    fn unix_seconds_and_offsets_are_accepted() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(deserialize_date_time("1709251200"), Some(at));
        assert_eq!(deserialize_date_time("2024-03-01T02:00:00+02:00"), Some(at));
        assert_eq!(deserialize_date_time("yesterday"), None);
    }
}
