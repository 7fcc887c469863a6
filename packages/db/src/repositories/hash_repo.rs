//! Hash repository. One document per field.

use std::collections::HashMap;

use jobstore_core::{DocumentType, HashEntry};

use super::{DocIdRow, DocumentRepository};
use crate::connection::{Database, DbError, check, take_rows};

pub struct HashRepository;

impl HashRepository {
    /// Insert or overwrite the given fields; other fields are left alone.
    pub async fn set_range(
        db: &Database,
        key: &str,
        fields: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), DbError> {
        for (field, value) in fields {
            let entry = HashEntry::new(key, field, value);
            let id = entry.id.clone();
            DocumentRepository::upsert(db, &id, entry).await?;
        }
        Ok(())
    }

    pub async fn get_all(db: &Database, key: &str) -> Result<HashMap<String, String>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query("SELECT * FROM document WHERE document_type = 'hash' AND key = $key")
                    .bind(("key", key.to_string())),
            )
            .await?;

        let entries: Vec<HashEntry> = take_rows(&mut response, 0)?;
        Ok(entries.into_iter().map(|e| (e.field, e.value)).collect())
    }

    pub async fn get_value(db: &Database, key: &str, field: &str) -> Result<Option<String>, DbError> {
        let entry: Option<HashEntry> =
            DocumentRepository::get(db, DocumentType::Hash, &HashEntry::field_id(key, field)).await?;
        Ok(entry.map(|e| e.value))
    }

    /// Remove every field of a hash. Returns how many fields went.
    pub async fn remove(db: &Database, key: &str) -> Result<u64, DbError> {
        let response = db
            .run(
                db.client()
                    .query("DELETE document WHERE document_type = 'hash' AND key = $key RETURN BEFORE")
                    .bind(("key", key.to_string())),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut check(response)?, 0)?;
        Ok(rows.len() as u64)
    }
}
