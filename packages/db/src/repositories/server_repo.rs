//! Server repository.

use chrono::{DateTime, Utc};
use jobstore_core::{DocumentType, Server};

use super::{CountRow, DocIdRow, DocumentRepository, first_count, millis};
use crate::connection::{Database, DbError, check, take_rows};

/// Repository for server registry operations.
pub struct ServerRepository;

impl ServerRepository {
    /// Register a server, replacing a previous registration with the same id.
    pub async fn announce(db: &Database, server: Server) -> Result<Server, DbError> {
        let id = server.id.clone();
        DocumentRepository::upsert(db, &id, server).await
    }

    /// Refresh `last_heartbeat`. Returns false when the server is unknown.
    pub async fn heartbeat(db: &Database, server_id: &str, at: DateTime<Utc>) -> Result<bool, DbError> {
        let response = db
            .run(
                db.client()
                    .query(
                        "UPDATE type::thing('document', $id) SET last_heartbeat = $at WHERE document_type = 'server' RETURN AFTER",
                    )
                    .bind(("id", Server::document_id(server_id)))
                    .bind(("at", millis(at))),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut check(response)?, 0)?;
        Ok(!rows.is_empty())
    }

    pub async fn remove(db: &Database, server_id: &str) -> Result<bool, DbError> {
        DocumentRepository::delete(db, DocumentType::Server, &Server::document_id(server_id)).await
    }

    /// Remove servers whose last heartbeat is older than `cutoff`.
    pub async fn remove_stale(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let response = db
            .run(
                db.client()
                    .query("DELETE document WHERE document_type = 'server' AND last_heartbeat < $cutoff RETURN BEFORE")
                    .bind(("cutoff", millis(cutoff))),
            )
            .await?;

        let rows: Vec<DocIdRow> = take_rows(&mut check(response)?, 0)?;
        Ok(rows.len() as u64)
    }

    /// All servers, most recently started first.
    pub async fn list(db: &Database) -> Result<Vec<Server>, DbError> {
        let mut response = db
            .run(db.client().query(
                "SELECT * FROM document WHERE document_type = 'server' ORDER BY created_on DESC, doc_id DESC",
            ))
            .await?;

        take_rows(&mut response, 0)
    }

    pub async fn count(db: &Database) -> Result<u64, DbError> {
        let mut response = db
            .run(
                db.client()
                    .query("SELECT count() AS count FROM document WHERE document_type = 'server' GROUP ALL"),
            )
            .await?;

        let rows: Vec<CountRow> = take_rows(&mut response, 0)?;
        Ok(first_count(rows))
    }
}
