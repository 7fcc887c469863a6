//! SurrealDB persistence for the job storage.
//!
//! This crate provides database connectivity, repositories over the shared
//! `document` table, distributed locks and the document-backed job queue.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod lock;
mod options;
pub mod queue;
pub mod repositories;
mod schema;

pub use connection::{Client, Database, DbConfig, DbError, ensure_not_empty};
pub use lock::DistributedLock;
pub use options::StorageOptions;
pub use schema::init_schema;

/// Connect to the database and make sure the schema exists.
///
/// This should be called once at application startup.
pub async fn init(config: &DbConfig, options: &StorageOptions) -> Result<Database, DbError> {
    let db = Database::connect(config, options.request_timeout).await?;
    init_schema(&db).await?;
    Ok(db)
}
