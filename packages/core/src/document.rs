//! Shared document envelope: type discriminator, ids and timestamps.

use std::sync::{LazyLock, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

/// Name of the table holding every document kind.
pub const DOCUMENT_TABLE: &str = "document";

/// Discriminator used to partition the shared document space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Job,
    State,
    Queue,
    Counter,
    Set,
    Hash,
    Server,
    Lock,
}

impl DocumentType {
    /// Every document type, in sweep order.
    pub const ALL: [DocumentType; 8] = [
        DocumentType::Lock,
        DocumentType::Job,
        DocumentType::State,
        DocumentType::Queue,
        DocumentType::Counter,
        DocumentType::Set,
        DocumentType::Hash,
        DocumentType::Server,
    ];

    /// The value stored in the `document_type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Job => "job",
            DocumentType::State => "state",
            DocumentType::Queue => "queue",
            DocumentType::Counter => "counter",
            DocumentType::Set => "set",
            DocumentType::Hash => "hash",
            DocumentType::Server => "server",
            DocumentType::Lock => "lock",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static ID_GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a new document id.
///
/// Ids are monotonic within a process, so sorting by id gives insertion order
/// for documents sharing the same `created_on` millisecond.
pub fn new_document_id() -> String {
    let mut generator = ID_GENERATOR.lock().unwrap_or_else(PoisonError::into_inner);
    generator
        .generate()
        .unwrap_or_else(|_| Ulid::new())
        .to_string()
}

/// Current time at the precision documents are persisted with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Build a deterministic id from a prefix and a list of parts.
///
/// Parts are length-prefixed so `("a:b", "c")` and `("a", "b:c")` never collide.
pub fn composite_id(prefix: &str, parts: &[&str]) -> String {
    let mut id = String::from(prefix);
    for part in parts {
        id.push(':');
        id.push_str(&part.len().to_string());
        id.push(':');
        id.push_str(part);
    }
    id
}
