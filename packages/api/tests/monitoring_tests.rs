#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use api::{CancellationToken, DbError, Granularity, InvocationData, JobState, ServerContext, states};
use chrono::{TimeDelta, TimeZone, Utc};
use db::repositories::DocumentRepository;
use jobstore_core::dto::serialize_date_time;
use jobstore_core::{DocumentType, RECURRING_JOBS_SET, SUCCEEDED_KEY, daily_stats_key, hourly_stats_key, now};

#[tokio::test]
async fn test_enqueue_succeed_and_aggregate_end_to_end() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let job_id = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection
        .set_job_state(&job_id, JobState::new(states::ENQUEUED).with_data("Queue", "default"))
        .await?;
    connection.enqueue("default", &job_id).await?;

    let queues = monitoring.queues().await?;
    let default = queues.iter().find(|queue| queue.name == "default").expect("default queue");
    assert_eq!(default.length, 1);
    assert_eq!(default.fetched, 0);
    assert!(default.first_jobs.iter().any(|entry| entry.job_id == job_id));

    let succeeded_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    connection
        .set_job_state(
            &job_id,
            JobState::new(states::SUCCEEDED)
                .with_data("SucceededAt", serialize_date_time(succeeded_at))
                .with_data("PerformanceDuration", "120")
                .with_data("Latency", "30")
                .with_data("Result", "\"done\""),
        )
        .await?;

    let succeeded = monitoring.succeeded_jobs(0, 10).await?;
    let entry = succeeded.iter().find(|entry| entry.job_id == job_id).expect("listed");
    assert_eq!(entry.dto.succeeded_at, Some(succeeded_at));
    assert_eq!(entry.dto.total_duration, Some(150));
    assert_eq!(entry.dto.result.as_deref(), Some("\"done\""));
    assert_eq!(entry.dto.job.as_ref().map(|job| job.method.as_str()), Some("Build"));

    connection.increment_counter(SUCCEEDED_KEY).await?;
    let components = storage.start_components().await?;
    assert_eq!(components.run_aggregation_now().await?, 1);
    assert_eq!(monitoring.get_statistics().await?.succeeded, 1);

    // Statistics do not depend on when the aggregator last ran
    connection.increment_counter(SUCCEEDED_KEY).await?;
    assert_eq!(monitoring.get_statistics().await?.succeeded, 2);
    assert_eq!(components.run_aggregation_now().await?, 1);
    assert_eq!(monitoring.get_statistics().await?.succeeded, 2);

    components.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_job_details_history_is_newest_first() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let job_id = connection.create_job(common::invocation(), common::no_parameters()).await?;
    let names = [states::ENQUEUED, states::PROCESSING, states::FAILED, states::ENQUEUED];
    for name in names {
        connection.set_job_state(&job_id, JobState::new(name)).await?;
    }

    let details = monitoring.job_details(&job_id).await?.expect("job exists");
    assert_eq!(details.history.len(), names.len());
    let history: Vec<&str> = details.history.iter().map(|state| state.state_name.as_str()).collect();
    assert_eq!(history, vec![states::ENQUEUED, states::FAILED, states::PROCESSING, states::ENQUEUED]);
    assert!(details.history.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    assert_eq!(details.job.expect("invocation").type_name, "Reports.Builder");

    assert!(monitoring.job_details("missing").await?.is_none());
    assert!(matches!(monitoring.job_details("").await, Err(DbError::InvalidArgument(_))));

    Ok(())
}

#[tokio::test]
async fn test_statistics() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let empty = monitoring.get_statistics().await?;
    assert_eq!(empty.enqueued, 0);
    assert_eq!(empty.servers, 0);
    // The configured queue is always reported
    assert_eq!(empty.queues, 1);

    for name in [states::ENQUEUED, states::ENQUEUED, states::FAILED, states::PROCESSING] {
        let job_id = connection.create_job(common::invocation(), common::no_parameters()).await?;
        connection.set_job_state(&job_id, JobState::new(name)).await?;
    }
    // Jobs without a state are not counted anywhere
    connection.create_job(common::invocation(), common::no_parameters()).await?;

    let job_id = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection.enqueue("critical", &job_id).await?;
    connection.announce_server("worker-1", ServerContext::default()).await?;
    connection.add_to_set(RECURRING_JOBS_SET, "nightly").await?;
    connection.add_to_set(RECURRING_JOBS_SET, "weekly").await?;
    connection.increment_counter("stats:deleted").await?;

    let stats = monitoring.get_statistics().await?;
    assert_eq!(stats.enqueued, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.scheduled, 0);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.recurring, 2);
    assert_eq!(stats.servers, 1);
    assert_eq!(stats.queues, 2);

    assert_eq!(monitoring.failed_count().await?, 1);
    assert_eq!(monitoring.processing_count().await?, 1);
    assert_eq!(monitoring.scheduled_count().await?, 0);
    assert_eq!(monitoring.succeeded_list_count().await?, 0);
    assert_eq!(monitoring.deleted_list_count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_queues_are_sorted_with_top_jobs() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let mut default_jobs = Vec::new();
    for _ in 0..7 {
        let job_id = connection.create_job(common::invocation(), common::no_parameters()).await?;
        connection.enqueue("default", &job_id).await?;
        default_jobs.push(job_id);
    }
    let critical = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection.enqueue("critical", &critical).await?;

    let queues = monitoring.queues().await?;
    let names: Vec<&str> = queues.iter().map(|queue| queue.name.as_str()).collect();
    assert_eq!(names, vec!["critical", "default"]);

    let default = &queues[1];
    assert_eq!(default.length, 7);
    let top: Vec<&str> = default.first_jobs.iter().map(|entry| entry.job_id.as_str()).collect();
    assert_eq!(top, default_jobs[..5].iter().map(String::as_str).collect::<Vec<_>>());

    // A fetched entry no longer counts as enqueued
    let fetched = connection
        .fetch_next_job(&["default".to_string()], &CancellationToken::new())
        .await?
        .expect("entry");
    assert_eq!(fetched.job_id(), default_jobs[0]);
    assert_eq!(monitoring.enqueued_count("default").await?, 6);
    assert_eq!(monitoring.fetched_count("default").await?, 6);
    fetched.complete().await?;

    let page = monitoring.enqueued_jobs("default", 1, 2).await?;
    let page: Vec<&str> = page.iter().map(|entry| entry.job_id.as_str()).collect();
    assert_eq!(page, vec![default_jobs[2].as_str(), default_jobs[3].as_str()]);

    let fetched_page = monitoring.fetched_jobs("default", 0, 100).await?;
    assert_eq!(fetched_page.len(), 6);

    assert!(matches!(monitoring.enqueued_count("").await, Err(DbError::InvalidArgument(_))));

    Ok(())
}

#[tokio::test]
async fn test_enqueued_jobs_report_their_current_state() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let enqueued = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection.set_job_state(&enqueued, JobState::new(states::ENQUEUED)).await?;
    connection.enqueue("default", &enqueued).await?;

    let stateless = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection.enqueue("default", &stateless).await?;

    // Entries pointing at deleted jobs are skipped
    connection.enqueue("default", "vanished").await?;

    let jobs = monitoring.enqueued_jobs("default", 0, 10).await?;
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].job_id, enqueued);
    assert!(jobs[0].dto.in_enqueued_state);
    assert_eq!(jobs[0].dto.state.as_deref(), Some(states::ENQUEUED));
    assert_eq!(jobs[1].job_id, stateless);
    assert!(!jobs[1].dto.in_enqueued_state);
    assert_eq!(jobs[1].dto.state, None);

    Ok(())
}

#[tokio::test]
async fn test_state_listings_extract_state_data() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();

    let processing = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection
        .set_job_state(
            &processing,
            JobState::new(states::PROCESSING)
                .with_data("ServerName", "legacy-worker")
                .with_data("StartedAt", at.timestamp().to_string()),
        )
        .await?;

    let scheduled = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection
        .set_job_state(
            &scheduled,
            JobState::new(states::SCHEDULED)
                .with_data("EnqueueAt", serialize_date_time(at + TimeDelta::hours(1)))
                .with_data("ScheduledAt", serialize_date_time(at)),
        )
        .await?;

    let failed = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection
        .set_job_state(
            &failed,
            JobState::new(states::FAILED)
                .with_reason("An exception occurred during performance of the job")
                .with_data("FailedAt", serialize_date_time(at))
                .with_data("ExceptionType", "System.InvalidOperationException")
                .with_data("ExceptionMessage", "Nope")
                .with_data("ExceptionDetails", "at Reports.Builder.Build()"),
        )
        .await?;

    let deleted = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection
        .set_job_state(&deleted, JobState::new(states::DELETED).with_data("DeletedAt", serialize_date_time(at)))
        .await?;

    let jobs = monitoring.processing_jobs(0, 10).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, processing);
    assert_eq!(jobs[0].dto.server_id.as_deref(), Some("legacy-worker"));
    assert_eq!(jobs[0].dto.started_at, Some(at));

    let jobs = monitoring.scheduled_jobs(0, 10).await?;
    assert_eq!(jobs[0].dto.enqueue_at, Some(at + TimeDelta::hours(1)));
    assert_eq!(jobs[0].dto.scheduled_at, Some(at));

    let jobs = monitoring.failed_jobs(0, 10).await?;
    assert_eq!(jobs[0].job_id, failed);
    assert_eq!(jobs[0].dto.failed_at, Some(at));
    assert_eq!(jobs[0].dto.exception_type.as_deref(), Some("System.InvalidOperationException"));
    assert_eq!(jobs[0].dto.exception_message.as_deref(), Some("Nope"));
    assert!(jobs[0].dto.reason.is_some());

    let jobs = monitoring.deleted_jobs(0, 10).await?;
    assert_eq!(jobs[0].job_id, deleted);
    assert_eq!(jobs[0].dto.deleted_at, Some(at));

    // Missing duration parts leave the total empty
    let jobs = monitoring.succeeded_jobs(0, 10).await?;
    assert!(jobs.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_state_listings_are_newest_first_and_paginated() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let mut job_ids = Vec::new();
    for _ in 0..4 {
        let job_id = connection.create_job(common::invocation(), common::no_parameters()).await?;
        connection.set_job_state(&job_id, JobState::new(states::SUCCEEDED)).await?;
        job_ids.push(job_id);
    }

    let page = monitoring.succeeded_jobs(1, 2).await?;
    let page: Vec<&str> = page.iter().map(|entry| entry.job_id.as_str()).collect();
    assert_eq!(page, vec![job_ids[2].as_str(), job_ids[1].as_str()]);
    assert_eq!(monitoring.succeeded_list_count().await?, 4);

    Ok(())
}

#[tokio::test]
async fn test_listing_skips_jobs_with_missing_state() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let kept = connection.create_job(common::invocation(), common::no_parameters()).await?;
    connection.set_job_state(&kept, JobState::new(states::FAILED)).await?;

    let orphan = connection.create_job(common::invocation(), common::no_parameters()).await?;
    let state = connection
        .set_job_state(&orphan, JobState::new(states::FAILED))
        .await?
        .expect("job exists");
    DocumentRepository::delete(storage.database(), DocumentType::State, &state.id).await?;

    let jobs = monitoring.failed_jobs(0, 10).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, kept);
    // The count is over jobs, not the joined view
    assert_eq!(monitoring.failed_count().await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_undecodable_invocation_is_listed_without_job() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();

    let broken = InvocationData::new("Reports.Builder", "Build", vec!["System.String".to_string()], Vec::new());
    let job_id = connection.create_job(broken, common::no_parameters()).await?;
    connection.set_job_state(&job_id, JobState::new(states::FAILED)).await?;

    let jobs = monitoring.failed_jobs(0, 10).await?;
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].dto.job.is_none());

    let details = monitoring.job_details(&job_id).await?.expect("job exists");
    assert!(details.job.is_none());
    assert_eq!(details.history.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_timelines_have_one_entry_per_bucket() -> Result<(), Box<dyn Error>> {
    let storage = common::setup_storage().await?;
    let connection = storage.connection();
    let monitoring = storage.monitoring_api();
    let today = now();

    connection.increment_counter(&daily_stats_key("succeeded", today)).await?;
    connection.increment_counter(&daily_stats_key("succeeded", today)).await?;
    connection
        .increment_counter(&daily_stats_key("succeeded", today - TimeDelta::days(2)))
        .await?;
    // Outside the window
    connection
        .increment_counter(&daily_stats_key("succeeded", today - TimeDelta::days(7)))
        .await?;
    connection.increment_counter(&hourly_stats_key("failed", today)).await?;

    let daily = monitoring.succeeded_by_dates_count().await?;
    assert_eq!(daily.len(), 7);
    assert_eq!(daily.values().sum::<i64>(), 3);
    assert_eq!(daily.values().last().copied(), Some(2));

    let hourly = monitoring.hourly_failed_jobs().await?;
    assert_eq!(hourly.len(), 24);
    assert_eq!(hourly.values().sum::<i64>(), 1);

    assert_eq!(monitoring.failed_by_dates_count().await?.len(), 7);
    assert!(monitoring.failed_by_dates_count().await?.values().all(|count| *count == 0));
    assert_eq!(monitoring.hourly_succeeded_jobs().await?.values().sum::<i64>(), 0);

    let fixed = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
    connection.increment_counter("stats:succeeded:2024-03-02-09").await?;
    let timeline = monitoring.timeline_stats("succeeded", Granularity::Hourly, fixed).await?;
    assert_eq!(timeline[&Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap()], 1);

    Ok(())
}
