//! Server documents.

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentType, now};

/// What a server announces about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerContext {
    pub queues: Vec<String>,
    pub worker_count: u32,
}

/// A processing server registered with the storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    pub server_id: String,
    #[serde(default)]
    pub queues: Vec<String>,
    pub workers: u32,
    #[serde(with = "ts_milliseconds")]
    pub created_on: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub last_heartbeat: DateTime<Utc>,
}

impl Server {
    pub fn new(server_id: impl Into<String>, context: ServerContext) -> Self {
        let server_id = server_id.into();
        let at = now();
        Self {
            id: Self::document_id(&server_id),
            document_type: DocumentType::Server,
            server_id,
            queues: context.queues,
            workers: context.worker_count,
            created_on: at,
            last_heartbeat: at,
        }
    }

    pub fn document_id(server_id: &str) -> String {
        format!("server:{server_id}")
    }
}
