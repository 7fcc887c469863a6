//! Repository implementations for database operations.
//!
//! Every repository works on the shared `document` table and scopes its
//! queries by `document_type`.

mod counter_repo;
mod document_repo;
mod hash_repo;
mod job_repo;
mod lock_repo;
mod queue_repo;
mod server_repo;
mod set_repo;
mod state_repo;

pub use counter_repo::CounterRepository;
pub use document_repo::DocumentRepository;
pub use hash_repo::HashRepository;
pub use job_repo::JobRepository;
pub use lock_repo::LockRepository;
pub use queue_repo::QueueRepository;
pub use server_repo::ServerRepository;
pub use set_repo::SetRepository;
pub use state_repo::StateRepository;

use serde::Deserialize;

/// Row shape of `count() ... GROUP ALL` queries.
#[derive(Deserialize)]
struct CountRow {
    count: i64,
}

/// Row shape used when only the id of a touched document matters.
#[derive(Deserialize)]
struct DocIdRow {
    doc_id: String,
}

/// `GROUP ALL` yields no row at all when nothing matched.
fn first_count(rows: Vec<CountRow>) -> u64 {
    rows.first().map_or(0, |row| row.count.max(0) as u64)
}

/// Milliseconds since the epoch, the persisted timestamp format.
fn millis(at: chrono::DateTime<chrono::Utc>) -> i64 {
    at.timestamp_millis()
}
