//! Set repository.

use chrono::{DateTime, Utc};
use jobstore_core::{DocumentType, SetEntry};

use super::{CountRow, DocumentRepository, first_count, millis};
use crate::connection::{Database, DbError, check, take_rows};

pub struct SetRepository;

impl SetRepository {
    /// Add a member, or update its score if it is already present.
    pub async fn add(db: &Database, entry: SetEntry) -> Result<SetEntry, DbError> {
        let id = entry.id.clone();
        DocumentRepository::upsert(db, &id, entry).await
    }

    pub async fn remove(db: &Database, key: &str, value: &str) -> Result<bool, DbError> {
        DocumentRepository::delete(db, DocumentType::Set, &SetEntry::member_id(key, value)).await
    }

    /// Members of a set, lowest score first.
    pub async fn members(db: &Database, key: &str) -> Result<Vec<SetEntry>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        "SELECT * FROM document WHERE document_type = 'set' AND key = $key ORDER BY score ASC, value ASC",
                    )
                    .bind(("key", key.to_string())),
            )
            .await?;

        take_rows(&mut response, 0)
    }

    pub async fn count(db: &Database, key: &str) -> Result<u64, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query("SELECT count() AS count FROM document WHERE document_type = 'set' AND key = $key GROUP ALL")
                    .bind(("key", key.to_string())),
            )
            .await?;

        let rows: Vec<CountRow> = take_rows(&mut response, 0)?;
        Ok(first_count(rows))
    }

    /// The member with the lowest score within `[from_score, to_score]`.
    pub async fn first_by_lowest_score(
        db: &Database,
        key: &str,
        from_score: f64,
        to_score: f64,
    ) -> Result<Option<SetEntry>, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query(
                        r#"
                        SELECT * FROM document
                        WHERE document_type = 'set' AND key = $key AND score >= $from AND score <= $to
                        ORDER BY score ASC, value ASC
                        LIMIT 1
                        "#,
                    )
                    .bind(("key", key.to_string()))
                    .bind(("from", from_score))
                    .bind(("to", to_score)),
            )
            .await?;

        Ok(take_rows(&mut response, 0)?.into_iter().next())
    }

    /// Set (or clear) the expiry of every member of a set.
    pub async fn set_expire_on(
        db: &Database,
        key: &str,
        expire_on: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let query = match expire_on {
            Some(at) => db
                .client()
                .query("UPDATE document SET expire_on = $expire_on WHERE document_type = 'set' AND key = $key")
                .bind(("expire_on", millis(at))),
            None => db
                .client()
                .query("UPDATE document SET expire_on = NONE WHERE document_type = 'set' AND key = $key"),
        };

        check(db.run(query.bind(("key", key.to_string()))).await?)?;
        Ok(())
    }
}
