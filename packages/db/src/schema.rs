//! Database schema definitions using SurrealQL.

use crate::connection::{Database, DbError, check};

/// Initialize the database schema.
///
/// This creates the shared document table and its indexes. Safe to run on
/// every start-up.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    check(db.run(db.client().query(DOCUMENT_SCHEMA)).await?)?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Every document kind lives in one table, partitioned by `document_type`.
const DOCUMENT_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS document SCHEMALESS;

DEFINE FIELD IF NOT EXISTS doc_id ON document TYPE string;
DEFINE FIELD IF NOT EXISTS document_type ON document TYPE string
    ASSERT $value INSIDE ["job", "state", "queue", "counter", "set", "hash", "server", "lock"];

-- Partition scans
DEFINE INDEX IF NOT EXISTS document_type_idx ON document FIELDS document_type;
DEFINE INDEX IF NOT EXISTS document_expiry_idx ON document FIELDS document_type, expire_on;

-- Jobs by state, states by job
DEFINE INDEX IF NOT EXISTS job_state_idx ON document FIELDS document_type, state_name, created_on;
DEFINE INDEX IF NOT EXISTS state_job_idx ON document FIELDS document_type, job_id;

-- Queue polling
DEFINE INDEX IF NOT EXISTS queue_poll_idx ON document FIELDS document_type, name, fetched_at, created_on;

-- Key scoped lookups (counters, sets, hashes)
DEFINE INDEX IF NOT EXISTS document_key_idx ON document FIELDS document_type, key;
"#;
