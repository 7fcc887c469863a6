//! State repository. States are append-only; there is no update.

use jobstore_core::{DocumentType, State};

use super::{DocIdRow, DocumentRepository};
use crate::connection::{Database, DbError, check, take_rows};

pub struct StateRepository;

impl StateRepository {
    pub async fn get(db: &Database, id: &str) -> Result<Option<State>, DbError> {
        DocumentRepository::get(db, DocumentType::State, id).await
    }

    /// Every state of a job, newest first.
    pub async fn history(db: &Database, job_id: &str) -> Result<Vec<State>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT * FROM document
                        WHERE document_type = 'state' AND job_id = $job_id
                        ORDER BY created_on DESC, doc_id DESC
                        "#,
                    )
                    .bind(("job_id", job_id.to_string())),
            )
            .await?;

        take_rows(&mut response, 0)
    }

    /// Every listed state that still exists, in no particular order.
    pub async fn get_many(db: &Database, ids: Vec<String>) -> Result<Vec<State>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = db
            .run(
                db.client()
                    .query("SELECT * FROM document WHERE document_type = 'state' AND doc_id INSIDE $ids")
                    .bind(("ids", ids)),
            )
            .await?;

        take_rows(&mut response, 0)
    }

    /// Delete every state owned by the listed jobs. Returns how many went.
    pub async fn delete_for_jobs(db: &Database, job_ids: Vec<String>) -> Result<u64, DbError> {
        if job_ids.is_empty() {
            return Ok(0);
        }

        let response = db
            .run(
                db.client()
                    .query("DELETE document WHERE document_type = 'state' AND job_id INSIDE $job_ids RETURN BEFORE")
                    .bind(("job_ids", job_ids)),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut check(response)?, 0)?;
        Ok(rows.len() as u64)
    }
}
