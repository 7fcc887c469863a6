//! Type-agnostic document operations: point reads, deletes and expiry scans.

use chrono::{DateTime, Utc};
use jobstore_core::{DOCUMENT_TABLE, DocumentType};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{DocIdRow, millis};
use crate::connection::{Database, DbError, check, take_rows};

/// Repository for operations shared by every document kind.
pub struct DocumentRepository;

impl DocumentRepository {
    /// Insert a new document under `id`. Fails if the id is taken.
    pub async fn create<T>(db: &Database, id: &str, document: T) -> Result<T, DbError>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let record: Option<T> = db
            .run(db.client().create((DOCUMENT_TABLE, id.to_string())).content(document))
            .await?;

        record.ok_or_else(|| DbError::Query(format!("Failed to create document {id}")))
    }

    /// Insert or fully replace the document stored under `id`.
    pub async fn upsert<T>(db: &Database, id: &str, document: T) -> Result<T, DbError>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let record: Option<T> = db
            .run(db.client().upsert((DOCUMENT_TABLE, id.to_string())).content(document))
            .await?;

        record.ok_or_else(|| DbError::Query(format!("Failed to upsert document {id}")))
    }

    /// Point read of a document of the given type.
    pub async fn get<T: DeserializeOwned>(
        db: &Database,
        document_type: DocumentType,
        id: &str,
    ) -> Result<Option<T>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query("SELECT * FROM type::thing('document', $id) WHERE document_type = $document_type")
                    .bind(("id", id.to_string()))
                    .bind(("document_type", document_type.as_str())),
            )
            .await?;

        Ok(take_rows(&mut response, 0)?.into_iter().next())
    }

    /// Delete a document if it exists. Returns whether something was removed.
    pub async fn delete(db: &Database, document_type: DocumentType, id: &str) -> Result<bool, DbError> {
        let response = db
            .run(
                db.client()
                    .query(
                        "DELETE type::thing('document', $id) WHERE document_type = $document_type RETURN BEFORE",
                    )
                    .bind(("id", id.to_string()))
                    .bind(("document_type", document_type.as_str())),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut check(response)?, 0)?;
        Ok(!rows.is_empty())
    }

    /// Ids of up to `limit` documents of one type whose expiry has passed.
    ///
    /// Documents without a numeric `expire_on` never match.
    pub async fn expired_ids(
        db: &Database,
        document_type: DocumentType,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT doc_id FROM document
                        WHERE document_type = $document_type
                            AND type::is::number(expire_on)
                            AND expire_on <= $now
                        LIMIT $limit
                        "#,
                    )
                    .bind(("document_type", document_type.as_str()))
                    .bind(("now", millis(now)))
                    .bind(("limit", limit as i64)),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut response, 0)?;
        Ok(rows.into_iter().map(|row| row.doc_id).collect())
    }

    /// Delete the listed documents of one type. Ids already gone are ignored.
    ///
    /// Returns the ids actually removed by this call.
    pub async fn delete_many(
        db: &Database,
        document_type: DocumentType,
        ids: Vec<String>,
    ) -> Result<Vec<String>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = db
            .run(
                db.client()
                    .query(
                        "DELETE document WHERE document_type = $document_type AND doc_id INSIDE $ids RETURN BEFORE",
                    )
                    .bind(("document_type", document_type.as_str()))
                    .bind(("ids", ids)),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut check(response)?, 0)?;
        Ok(rows.into_iter().map(|row| row.doc_id).collect())
    }
}
