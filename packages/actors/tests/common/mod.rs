use std::time::Duration;

use db::{Database, DbConfig, DbError, StorageOptions};
use jobstore_core::new_document_id;

/// Options whose sweeps only run when asked to.
pub fn test_options() -> StorageOptions {
    StorageOptions::default()
        .with_request_timeout(Duration::from_secs(10))
        .with_counters_aggregate_interval(Duration::from_secs(3600))
        .with_expiration_check_interval(Duration::from_secs(3600))
        .with_lock_ttl(Duration::from_secs(30))
}

/// A fresh in-memory database with the schema applied.
pub async fn setup_db() -> Result<Database, DbError> {
    let config = DbConfig::memory().with_database(format!("test_{}", new_document_id()));
    db::init(&config, &test_options()).await
}
