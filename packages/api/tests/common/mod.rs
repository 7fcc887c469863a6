use std::collections::HashMap;
use std::time::Duration;

use api::{DbConfig, DbError, InvocationData, JobStorage, StorageOptions};
use jobstore_core::new_document_id;
use serde_json::json;

/// Options with a fast queue poll and sweeps that only run when asked to.
pub fn test_options() -> StorageOptions {
    StorageOptions::default()
        .with_request_timeout(Duration::from_secs(10))
        .with_queue_poll_interval(Duration::from_millis(50))
        .with_counters_aggregate_interval(Duration::from_secs(3600))
        .with_expiration_check_interval(Duration::from_secs(3600))
        .with_lock_ttl(Duration::from_secs(30))
        .with_queue_cache_ttl(Duration::ZERO)
}

/// A storage over a fresh in-memory database.
pub async fn setup_storage() -> Result<JobStorage, DbError> {
    let config = DbConfig::memory().with_database(format!("test_{}", new_document_id()));
    JobStorage::connect(config, test_options()).await
}

#[allow(dead_code)]
pub fn invocation() -> InvocationData {
    InvocationData::new(
        "Reports.Builder",
        "Build",
        vec!["System.String".to_string(), "System.Int32".to_string()],
        vec![json!("monthly"), json!(3)],
    )
}

#[allow(dead_code)]
pub fn no_parameters() -> HashMap<String, String> {
    HashMap::new()
}
