//! Queue-entry documents.

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentType, new_document_id, now};

/// Name of the queue used when none is configured.
pub const DEFAULT_QUEUE: &str = "default";

/// A job waiting in (or leased from) a named queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    /// Queue name.
    pub name: String,
    pub job_id: String,
    /// Set while a worker holds the lease; unset entries are visible to fetch.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub fetched_at: Option<DateTime<Utc>>,
    /// Token of the fetcher holding the lease.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub created_on: DateTime<Utc>,
}

impl QueueEntry {
    /// Create a visible entry for `job_id` in `queue`.
    pub fn new(queue: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            id: new_document_id(),
            document_type: DocumentType::Queue,
            name: queue.into(),
            job_id: job_id.into(),
            fetched_at: None,
            lease: None,
            created_on: now(),
        }
    }

    /// Whether the entry is currently leased.
    pub fn is_fetched(&self) -> bool {
        self.fetched_at.is_some()
    }
}
