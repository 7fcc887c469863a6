#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use jobstore_core::{
    Counter, DocumentType, InvocationData, Job, JobState, Lock, Server, ServerContext, SetEntry,
    State, now, states,
};
use serde_json::json;

use db::repositories::{
    CounterRepository, DocumentRepository, HashRepository, JobRepository, LockRepository,
    ServerRepository, SetRepository, StateRepository,
};
use db::{DbError, DistributedLock};

fn sample_job() -> Job {
    Job::new(
        InvocationData::new("Mailer", "Send", vec!["String".into()], vec![json!("a@b.c")]),
        HashMap::from([("CurrentCulture".to_string(), "en-US".to_string())]),
    )
}

#[tokio::test]
async fn test_job_and_state_history() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    let job = JobRepository::create(&db, sample_job()).await?;
    let loaded = JobRepository::get(&db, &job.id).await?.expect("job exists");
    assert_eq!(loaded, job);
    assert_eq!(loaded.invocation().deserialize()?.args, vec![json!("a@b.c")]);

    // A state id never resolves to a job
    let enqueued = JobRepository::append_state(&db, State::new(&job.id, JobState::new(states::ENQUEUED))).await?;
    assert!(JobRepository::get(&db, &enqueued.id).await?.is_none());

    let processing = JobRepository::append_state(
        &db,
        State::new(&job.id, JobState::new(states::PROCESSING).with_data("ServerId", "srv-1")),
    )
    .await?;

    let loaded = JobRepository::get(&db, &job.id).await?.expect("job exists");
    assert_eq!(loaded.state_name.as_deref(), Some(states::PROCESSING));
    assert_eq!(loaded.state_id.as_deref(), Some(processing.id.as_str()));

    let history = StateRepository::history(&db, &job.id).await?;
    let names: Vec<_> = history.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![states::PROCESSING, states::ENQUEUED]);
    assert_eq!(history[0].data["ServerId"], "srv-1");

    let found = StateRepository::get_many(&db, vec![enqueued.id.clone(), "missing".into()]).await?;
    assert_eq!(found.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_job_counts_and_listing() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let job = JobRepository::create(&db, sample_job()).await?;
        JobRepository::append_state(&db, State::new(&job.id, JobState::new(states::FAILED))).await?;
        ids.push(job.id);
    }
    let other = JobRepository::create(&db, sample_job()).await?;
    JobRepository::append_state(&db, State::new(&other.id, JobState::new(states::SUCCEEDED))).await?;
    // No state at all
    JobRepository::create(&db, sample_job()).await?;

    assert_eq!(JobRepository::count_in_state(&db, states::FAILED).await?, 3);
    assert_eq!(JobRepository::count_in_state(&db, states::DELETED).await?, 0);

    let counts = JobRepository::count_by_state(&db).await?;
    assert_eq!(counts.get(states::FAILED), Some(&3));
    assert_eq!(counts.get(states::SUCCEEDED), Some(&1));
    assert_eq!(counts.len(), 2);

    // Newest first, paginated
    let page = JobRepository::list_in_state(&db, states::FAILED, 1, 5).await?;
    let listed: Vec<_> = page.iter().map(|j| j.id.clone()).collect();
    assert_eq!(listed, vec![ids[1].clone(), ids[0].clone()]);

    let many = JobRepository::get_many(&db, ids.clone()).await?;
    assert_eq!(many.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_job_parameters_and_expiry() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    let job = JobRepository::create(&db, sample_job()).await?;
    JobRepository::append_state(&db, State::new(&job.id, JobState::new(states::SUCCEEDED))).await?;

    let mut parameters = job.parameters.clone();
    parameters.insert("RetryCount".into(), "2".into());
    assert!(JobRepository::set_parameters(&db, &job.id, parameters).await?);
    assert!(!JobRepository::set_parameters(&db, "missing", HashMap::new()).await?);

    let loaded = JobRepository::get(&db, &job.id).await?.expect("job exists");
    assert_eq!(loaded.parameters["RetryCount"], "2");
    assert_eq!(loaded.parameters["CurrentCulture"], "en-US");

    let past = now() - ChronoDuration::seconds(1);
    JobRepository::set_expire_on(&db, &job.id, Some(past)).await?;
    let expired_jobs = DocumentRepository::expired_ids(&db, DocumentType::Job, now(), 10).await?;
    let expired_states = DocumentRepository::expired_ids(&db, DocumentType::State, now(), 10).await?;
    assert_eq!(expired_jobs, vec![job.id.clone()]);
    assert_eq!(expired_states.len(), 1);

    JobRepository::set_expire_on(&db, &job.id, None).await?;
    assert!(DocumentRepository::expired_ids(&db, DocumentType::Job, now(), 10).await?.is_empty());
    assert!(DocumentRepository::expired_ids(&db, DocumentType::State, now(), 10).await?.is_empty());

    let removed = DocumentRepository::delete_many(&db, DocumentType::Job, vec![job.id.clone(), "gone".into()]).await?;
    assert_eq!(removed, vec![job.id.clone()]);
    assert_eq!(StateRepository::delete_for_jobs(&db, vec![job.id.clone()]).await?, 1);
    assert!(JobRepository::get(&db, &job.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_counters_fold_into_aggregate() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    for value in [1, 1, 1, -1] {
        CounterRepository::insert_raw(&db, Counter::raw("stats:succeeded", value, None)).await?;
    }
    CounterRepository::insert_raw(&db, Counter::raw("stats:deleted", 5, None)).await?;
    assert_eq!(CounterRepository::sum(&db, "stats:succeeded").await?, 2);
    assert_eq!(CounterRepository::sum(&db, "stats:unknown").await?, 0);

    let raws: Vec<Counter> = CounterRepository::raw_snapshot(&db, 100)
        .await?
        .into_iter()
        .filter(|c| c.key == "stats:succeeded")
        .collect();
    assert_eq!(raws.len(), 4);

    let expire_on = now() + ChronoDuration::days(1);
    CounterRepository::fold(
        &db,
        "stats:succeeded",
        raws.iter().map(|c| c.id.clone()).collect(),
        Some(expire_on),
    )
    .await?;

    // Value unchanged by compaction
    assert_eq!(CounterRepository::sum(&db, "stats:succeeded").await?, 2);
    let aggregate = CounterRepository::aggregate(&db, "stats:succeeded").await?.expect("aggregate exists");
    assert_eq!(aggregate.value, 2);
    assert_eq!(aggregate.expire_on, Some(expire_on));

    // Folding the same raws again finds nothing to delete
    CounterRepository::fold(&db, "stats:succeeded", raws.iter().map(|c| c.id.clone()).collect(), None).await?;
    assert_eq!(CounterRepository::sum(&db, "stats:succeeded").await?, 2);
    assert_eq!(
        CounterRepository::aggregate(&db, "stats:succeeded").await?.expect("aggregate exists").expire_on,
        Some(expire_on)
    );

    // A later raw adds on top of the aggregate
    CounterRepository::insert_raw(&db, Counter::raw("stats:succeeded", 3, None)).await?;
    let sums = CounterRepository::sums(&db, vec!["stats:succeeded".into(), "stats:deleted".into()]).await?;
    assert_eq!(sums["stats:succeeded"], 5);
    assert_eq!(sums["stats:deleted"], 5);

    Ok(())
}

#[tokio::test]
async fn test_sets_and_hashes() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    SetRepository::add(&db, SetEntry::new("schedule", "job-b", 20.0)).await?;
    SetRepository::add(&db, SetEntry::new("schedule", "job-a", 10.0)).await?;
    // Re-adding a member only moves its score
    SetRepository::add(&db, SetEntry::new("schedule", "job-b", 5.0)).await?;
    SetRepository::add(&db, SetEntry::new("other", "job-a", 1.0)).await?;

    assert_eq!(SetRepository::count(&db, "schedule").await?, 2);
    let members: Vec<_> = SetRepository::members(&db, "schedule")
        .await?
        .into_iter()
        .map(|e| e.value)
        .collect();
    assert_eq!(members, vec!["job-b".to_string(), "job-a".to_string()]);

    let first = SetRepository::first_by_lowest_score(&db, "schedule", 6.0, 100.0).await?;
    assert_eq!(first.map(|e| e.value).as_deref(), Some("job-a"));
    assert!(SetRepository::first_by_lowest_score(&db, "schedule", 50.0, 100.0).await?.is_none());

    assert!(SetRepository::remove(&db, "schedule", "job-b").await?);
    assert!(!SetRepository::remove(&db, "schedule", "job-b").await?);
    assert_eq!(SetRepository::count(&db, "schedule").await?, 1);

    HashRepository::set_range(
        &db,
        "recurring-job:nightly",
        [("Cron".to_string(), "0 0 * * *".to_string()), ("Queue".to_string(), "default".to_string())],
    )
    .await?;
    HashRepository::set_range(&db, "recurring-job:nightly", [("Queue".to_string(), "critical".to_string())]).await?;

    let all = HashRepository::get_all(&db, "recurring-job:nightly").await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all["Queue"], "critical");
    assert_eq!(
        HashRepository::get_value(&db, "recurring-job:nightly", "Cron").await?.as_deref(),
        Some("0 0 * * *")
    );
    assert_eq!(HashRepository::remove(&db, "recurring-job:nightly").await?, 2);
    assert!(HashRepository::get_all(&db, "recurring-job:nightly").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_server_registry() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    let context = ServerContext {
        queues: vec!["default".into()],
        worker_count: 4,
    };
    ServerRepository::announce(&db, Server::new("alpha", context.clone())).await?;
    ServerRepository::announce(&db, Server::new("beta", context)).await?;
    assert_eq!(ServerRepository::count(&db).await?, 2);

    let listed: Vec<_> = ServerRepository::list(&db).await?.into_iter().map(|s| s.server_id).collect();
    assert_eq!(listed, vec!["beta".to_string(), "alpha".to_string()]);

    assert!(ServerRepository::heartbeat(&db, "alpha", now() + ChronoDuration::minutes(10)).await?);
    assert!(!ServerRepository::heartbeat(&db, "ghost", now()).await?);

    // Only beta's heartbeat is older than the cutoff
    let removed = ServerRepository::remove_stale(&db, now() + ChronoDuration::minutes(1)).await?;
    assert_eq!(removed, 1);
    assert!(ServerRepository::remove(&db, "alpha").await?);
    assert_eq!(ServerRepository::count(&db).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_distributed_lock() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let ttl = Duration::from_secs(30);

    let lock = DistributedLock::acquire(&db, "locks:test", Duration::from_millis(100), ttl).await?;
    assert_eq!(lock.resource(), "locks:test");

    let contended = DistributedLock::acquire(&db, "locks:test", Duration::from_millis(150), ttl).await;
    assert!(matches!(contended, Err(DbError::LockTimeout { .. })));

    lock.release().await?;
    assert!(LockRepository::get(&db, "locks:test").await?.is_none());

    let again = DistributedLock::acquire(&db, "locks:test", Duration::from_millis(100), ttl).await?;
    again.release().await?;

    let empty = DistributedLock::acquire(&db, "", Duration::from_millis(100), ttl).await;
    assert!(matches!(empty, Err(DbError::InvalidArgument(_))));

    Ok(())
}

#[tokio::test]
async fn test_stale_lock_is_taken_over() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    // An orphaned lock whose TTL already ran out
    let orphan = Lock::new("locks:orphan", "crashed-worker", ChronoDuration::zero());
    assert!(LockRepository::try_create(&db, orphan).await?);

    let lock = DistributedLock::acquire(&db, "locks:orphan", Duration::from_millis(200), Duration::from_secs(30)).await?;
    let holder = LockRepository::get(&db, "locks:orphan").await?.expect("lock exists");
    assert_ne!(holder.owner, "crashed-worker");
    lock.release().await?;

    Ok(())
}

#[tokio::test]
async fn test_dropped_lock_is_released() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;

    {
        let _lock = DistributedLock::acquire(&db, "locks:scoped", Duration::from_millis(100), Duration::from_secs(30)).await?;
    }

    // Released in the background; a bounded wait covers it.
    let lock = DistributedLock::acquire(&db, "locks:scoped", Duration::from_secs(2), Duration::from_secs(30)).await?;
    lock.release().await?;

    Ok(())
}
