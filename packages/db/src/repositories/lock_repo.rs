//! Lock repository: the advisory lock primitive.

use chrono::{DateTime, Utc};
use jobstore_core::{DocumentType, Lock};

use super::{DocumentRepository, millis};
use crate::connection::{Database, DbError, check};

pub struct LockRepository;

impl LockRepository {
    pub async fn get(db: &Database, resource: &str) -> Result<Option<Lock>, DbError> {
        DocumentRepository::get(db, DocumentType::Lock, &Lock::resource_id(resource)).await
    }

    /// Try to take the lock. Returns false when somebody else holds it.
    pub async fn try_create(db: &Database, lock: Lock) -> Result<bool, DbError> {
        let resource = lock.resource.clone();
        let id = lock.id.clone();

        match DocumentRepository::create(db, &id, lock).await {
            Ok(_) => Ok(true),
            // Creating over an existing record fails; tell contention apart
            // from a store failure by looking the lock up.
            Err(err) => match Self::get(db, &resource).await? {
                Some(_) => Ok(false),
                None => Err(err),
            },
        }
    }

    /// Remove the lock if its TTL has passed.
    pub async fn delete_expired(db: &Database, resource: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        let response = db
            .run(
                db.client()
                    .query(
                        "DELETE type::thing('document', $id) WHERE document_type = 'lock' AND expire_on <= $now",
                    )
                    .bind(("id", Lock::resource_id(resource)))
                    .bind(("now", millis(now))),
            )
            .await?;

        check(response)?;
        Ok(())
    }

    /// Remove the lock if `owner` still holds it.
    pub async fn release(db: &Database, resource: &str, owner: &str) -> Result<(), DbError> {
        let response = db
            .run(
                db.client()
                    .query("DELETE type::thing('document', $id) WHERE document_type = 'lock' AND owner = $owner")
                    .bind(("id", Lock::resource_id(resource)))
                    .bind(("owner", owner.to_string())),
            )
            .await?;

        check(response)?;
        Ok(())
    }
}
