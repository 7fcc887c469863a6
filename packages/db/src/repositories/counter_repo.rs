//! Counter repository.
//!
//! Reads always sum raw and aggregate documents, so the value of a key does
//! not depend on when the aggregator last ran.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jobstore_core::{Counter, DocumentType};
use serde::Deserialize;

use super::{DocumentRepository, millis};
use crate::connection::{Database, DbError, check, take_rows};

/// Repository for counter persistence operations.
pub struct CounterRepository;

#[derive(Deserialize)]
struct KeyTotal {
    key: String,
    total: i64,
}

impl CounterRepository {
    /// Record one raw counter event.
    pub async fn insert_raw(db: &Database, counter: Counter) -> Result<Counter, DbError> {
        let id = counter.id.clone();
        DocumentRepository::create(db, &id, counter).await
    }

    /// Logical value of a key. Unknown keys are 0.
    pub async fn sum(db: &Database, key: &str) -> Result<i64, DbError> {
        let totals = Self::sums(db, vec![key.to_string()]).await?;
        Ok(totals.get(key).copied().unwrap_or(0))
    }

    /// Logical values of several keys at once. Keys without counters are absent.
    pub async fn sums(db: &Database, keys: Vec<String>) -> Result<HashMap<String, i64>, DbError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT key, math::sum(value) AS total
                        FROM document
                        WHERE document_type = 'counter' AND key INSIDE $keys
                        GROUP BY key
                        "#,
                    )
                    .bind(("keys", keys)),
            )
            .await?;

        let rows: Vec<KeyTotal> = take_rows(&mut response, 0)?;
        Ok(rows.into_iter().map(|row| (row.key, row.total)).collect())
    }

    /// Up to `limit` raw counters, as they are right now.
    pub async fn raw_snapshot(db: &Database, limit: usize) -> Result<Vec<Counter>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query("SELECT * FROM document WHERE document_type = 'counter' AND kind = 'raw' LIMIT $limit")
                    .bind(("limit", limit as i64)),
            )
            .await?;

        take_rows(&mut response, 0)
    }

    /// The aggregate document of a key, if one was folded yet.
    pub async fn aggregate(db: &Database, key: &str) -> Result<Option<Counter>, DbError> {
        DocumentRepository::get(db, DocumentType::Counter, &Counter::aggregate_id(key)).await
    }

    /// Fold the listed raw counters of `key` into its aggregate.
    ///
    /// The aggregate grows by the value of the raws this call actually deleted,
    /// inside one transaction. Raws already folded elsewhere add nothing, so
    /// folding the same ids twice is a no-op.
    pub async fn fold(
        db: &Database,
        key: &str,
        raw_ids: Vec<String>,
        expire_on: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let expiry = if expire_on.is_some() {
            ", expire_on = $expire_on"
        } else {
            ""
        };

        let query = format!(
            r#"
            BEGIN TRANSACTION;
            LET $gone = (
                DELETE document
                    WHERE document_type = 'counter' AND kind = 'raw' AND key = $key AND doc_id INSIDE $raw_ids
                    RETURN BEFORE
            );
            IF array::len($gone) > 0 {{
                UPSERT type::thing('document', $aggregate_id)
                    SET doc_id = $aggregate_id,
                        document_type = 'counter',
                        kind = 'aggregate',
                        key = $key,
                        value = (value ?? 0) + math::sum($gone.value){expiry};
            }};
            COMMIT TRANSACTION;
            "#
        );

        let mut request = db
            .client()
            .query(query)
            .bind(("raw_ids", raw_ids))
            .bind(("aggregate_id", Counter::aggregate_id(key)))
            .bind(("key", key.to_string()));

        if let Some(at) = expire_on {
            request = request.bind(("expire_on", millis(at)));
        }

        check(db.run(request).await?)?;
        Ok(())
    }
}
