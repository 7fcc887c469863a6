use std::time::Duration;

use db::{Database, DbConfig, DbError, StorageOptions};
use jobstore_core::new_document_id;

/// Options with intervals short enough for tests.
#[allow(dead_code)]
pub fn test_options() -> StorageOptions {
    StorageOptions::default()
        .with_request_timeout(Duration::from_secs(10))
        .with_queue_poll_interval(Duration::from_millis(50))
        .with_lock_ttl(Duration::from_secs(30))
        .with_queue_cache_ttl(Duration::ZERO)
}

/// A fresh in-memory database with the schema applied.
pub async fn setup_db() -> Result<Database, DbError> {
    let config = DbConfig::memory().with_database(format!("test_{}", new_document_id()));
    db::init(&config, &test_options()).await
}
