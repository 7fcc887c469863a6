//! Job repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jobstore_core::{DocumentType, Job, State};
use serde::Deserialize;

use super::{CountRow, DocumentRepository, first_count, millis};
use crate::connection::{Database, DbError, check, take_rows};

/// Repository for job persistence operations.
pub struct JobRepository;

impl JobRepository {
    /// Create a new job in the database.
    pub async fn create(db: &Database, job: Job) -> Result<Job, DbError> {
        let id = job.id.clone();
        DocumentRepository::create(db, &id, job).await
    }

    /// Get a job by ID.
    pub async fn get(db: &Database, id: &str) -> Result<Option<Job>, DbError> {
        DocumentRepository::get(db, DocumentType::Job, id).await
    }

    /// Get every listed job that still exists, in no particular order.
    pub async fn get_many(db: &Database, ids: Vec<String>) -> Result<Vec<Job>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = db
            .run(
                db.client()
                    .query("SELECT * FROM document WHERE document_type = 'job' AND doc_id INSIDE $ids")
                    .bind(("ids", ids)),
            )
            .await?;

        take_rows(&mut response, 0)
    }

    /// Persist `state` and move the job's current-state pointer to it, in one
    /// transaction.
    pub async fn append_state(db: &Database, state: State) -> Result<State, DbError> {
        let response = db
            .run(
                db.client()
                    .query(
                        r#"
                        BEGIN TRANSACTION;
                        CREATE type::thing('document', $state_id) CONTENT $state;
                        UPDATE type::thing('document', $job_id)
                            SET state_id = $state_id, state_name = $state_name
                            WHERE document_type = 'job';
                        COMMIT TRANSACTION;
                        "#,
                    )
                    .bind(("state_id", state.id.clone()))
                    .bind(("job_id", state.job_id.clone()))
                    .bind(("state_name", state.name.clone()))
                    .bind(("state", state.clone())),
            )
            .await?;

        check(response)?;
        Ok(state)
    }

    /// Replace the job's parameter map.
    pub async fn set_parameters(
        db: &Database,
        id: &str,
        parameters: HashMap<String, String>,
    ) -> Result<bool, DbError> {
        let response = db
            .run(
                db.client()
                    .query(
                        "UPDATE type::thing('document', $id) SET parameters = $parameters WHERE document_type = 'job' RETURN AFTER",
                    )
                    .bind(("id", id.to_string()))
                    .bind(("parameters", parameters)),
            )
            .await?;

        let jobs: Vec<Job> = take_rows(&mut check(response)?, 0)?;
        Ok(!jobs.is_empty())
    }

    /// Set (or clear, with `None`) the expiry of a job and all of its states.
    pub async fn set_expire_on(
        db: &Database,
        id: &str,
        expire_on: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        const SCOPE: &str =
            "WHERE (document_type = 'job' AND doc_id = $id) OR (document_type = 'state' AND job_id = $id)";

        let query = match expire_on {
            Some(at) => db
                .client()
                .query(format!("UPDATE document SET expire_on = $expire_on {SCOPE}"))
                .bind(("expire_on", millis(at))),
            None => db
                .client()
                .query(format!("UPDATE document SET expire_on = NONE {SCOPE}")),
        };

        let response = db.run(query.bind(("id", id.to_string()))).await?;
        check(response)?;
        Ok(())
    }

    /// Number of jobs whose current state is `state_name`.
    pub async fn count_in_state(db: &Database, state_name: &str) -> Result<u64, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        "SELECT count() AS count FROM document WHERE document_type = 'job' AND state_name = $state_name GROUP ALL",
                    )
                    .bind(("state_name", state_name.to_string())),
            )
            .await?;

        let rows: Vec<CountRow> = take_rows(&mut response, 0)?;
        Ok(first_count(rows))
    }

    /// Job counts per current state name. Jobs without a state are left out.
    pub async fn count_by_state(db: &Database) -> Result<HashMap<String, u64>, DbError> {
        let mut response = db
            .run(db.client().query(
                r#"
                SELECT state_name, count() AS count
                FROM document
                WHERE document_type = 'job' AND type::is::string(state_name) AND state_name != ''
                GROUP BY state_name
                "#,
            ))
            .await?;

        #[derive(Deserialize)]
        struct StateCount {
            state_name: String,
            count: i64,
        }

        let counts: Vec<StateCount> = take_rows(&mut response, 0)?;

        Ok(counts
            .into_iter()
            .map(|c| (c.state_name, c.count.max(0) as u64))
            .collect())
    }

    /// A page of jobs in `state_name`, newest first.
    pub async fn list_in_state(
        db: &Database,
        state_name: &str,
        from: usize,
        count: usize,
    ) -> Result<Vec<Job>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT * FROM document
                        WHERE document_type = 'job' AND state_name = $state_name
                        ORDER BY created_on DESC, doc_id DESC
                        LIMIT $limit START $start
                        "#,
                    )
                    .bind(("state_name", state_name.to_string()))
                    .bind(("limit", count as i64))
                    .bind(("start", from as i64)),
            )
            .await?;

        take_rows(&mut response, 0)
    }
}
