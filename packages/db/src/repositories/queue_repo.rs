//! Queue-entry repository.

use chrono::{DateTime, Utc};
use jobstore_core::{DocumentType, QueueEntry};
use serde::Deserialize;

use super::{CountRow, DocumentRepository, first_count, millis};
use crate::connection::{Database, DbError, check, take_rows};

/// Repository for queue-entry persistence operations.
pub struct QueueRepository;

impl QueueRepository {
    /// Insert a visible entry.
    pub async fn insert(db: &Database, entry: QueueEntry) -> Result<QueueEntry, DbError> {
        let id = entry.id.clone();
        DocumentRepository::create(db, &id, entry).await
    }

    pub async fn get(db: &Database, id: &str) -> Result<Option<QueueEntry>, DbError> {
        DocumentRepository::get(db, DocumentType::Queue, id).await
    }

    /// The oldest visible entry among `queues` (created_on, then insertion order).
    pub async fn oldest_visible(db: &Database, queues: Vec<String>) -> Result<Option<QueueEntry>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT * FROM document
                        WHERE document_type = 'queue' AND name INSIDE $queues AND fetched_at = NONE
                        ORDER BY created_on ASC, doc_id ASC
                        LIMIT 1
                        "#,
                    )
                    .bind(("queues", queues)),
            )
            .await?;

        Ok(take_rows(&mut response, 0)?.into_iter().next())
    }

    /// Mark a visible entry as fetched under `lease`.
    ///
    /// The entry is re-read after the write and only counts as claimed when it
    /// still carries `lease`. Returns `None` when the entry is gone or another
    /// fetcher claimed it.
    pub async fn claim(
        db: &Database,
        id: &str,
        lease: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, DbError> {
        let response = db
            .run(
                db.client()
                    .query(
                        r#"
                        UPDATE type::thing('document', $id)
                            SET fetched_at = $fetched_at, lease = $lease
                            WHERE document_type = 'queue' AND fetched_at = NONE
                        "#,
                    )
                    .bind(("id", id.to_string()))
                    .bind(("lease", lease.to_string()))
                    .bind(("fetched_at", millis(at))),
            )
            .await?;
        check(response)?;

        Ok(Self::get(db, id)
            .await?
            .filter(|entry| entry.lease.as_deref() == Some(lease)))
    }

    /// Make a fetched entry visible again.
    pub async fn requeue(db: &Database, id: &str) -> Result<(), DbError> {
        let response = db
            .run(
                db.client()
                    .query("UPDATE type::thing('document', $id) SET fetched_at = NONE, lease = NONE WHERE document_type = 'queue'")
                    .bind(("id", id.to_string())),
            )
            .await?;

        check(response)?;
        Ok(())
    }

    /// Remove an entry for good.
    pub async fn delete(db: &Database, id: &str) -> Result<(), DbError> {
        DocumentRepository::delete(db, DocumentType::Queue, id).await?;
        Ok(())
    }

    /// Number of visible entries in a queue.
    pub async fn count_visible(db: &Database, queue: &str) -> Result<u64, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        "SELECT count() AS count FROM document WHERE document_type = 'queue' AND name = $name AND fetched_at = NONE GROUP ALL",
                    )
                    .bind(("name", queue.to_string())),
            )
            .await?;

        let rows: Vec<CountRow> = take_rows(&mut response, 0)?;
        Ok(first_count(rows))
    }

    /// A page of visible entries in a queue, oldest first.
    pub async fn list_visible(
        db: &Database,
        queue: &str,
        from: usize,
        count: usize,
    ) -> Result<Vec<QueueEntry>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT * FROM document
                        WHERE document_type = 'queue' AND name = $name AND fetched_at = NONE
                        ORDER BY created_on ASC, doc_id ASC
                        LIMIT $limit START $start
                        "#,
                    )
                    .bind(("name", queue.to_string()))
                    .bind(("limit", count as i64))
                    .bind(("start", from as i64)),
            )
            .await?;

        take_rows(&mut response, 0)
    }

    /// Names of every queue that currently holds at least one entry.
    pub async fn distinct_names(db: &Database) -> Result<Vec<String>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query("SELECT name FROM document WHERE document_type = 'queue' GROUP BY name"),
            )
            .await?;

        #[derive(Deserialize)]
        struct NameRow {
            name: String,
        }

        let rows: Vec<NameRow> = take_rows(&mut response, 0)?;
        Ok(rows.into_iter().map(|row| row.name).collect())
    }
}
