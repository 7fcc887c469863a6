//! Counter documents and statistics keys.

use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentType, new_document_id};

/// Total number of succeeded jobs.
pub const SUCCEEDED_KEY: &str = "stats:succeeded";
/// Total number of deleted jobs.
pub const DELETED_KEY: &str = "stats:deleted";

/// Whether a counter document is a single event or a compacted total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// One document per increment/decrement.
    Raw,
    /// The folded total of previously swept raw counters.
    Aggregate,
}

/// A counter document. The logical value of a key is the sum of every
/// counter document with that key, whatever its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    pub key: String,
    pub value: i64,
    pub kind: CounterKind,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub expire_on: Option<DateTime<Utc>>,
}

impl Counter {
    /// A raw counter recording one change of `value`.
    pub fn raw(key: impl Into<String>, value: i64, expire_on: Option<DateTime<Utc>>) -> Self {
        Self {
            id: new_document_id(),
            document_type: DocumentType::Counter,
            key: key.into(),
            value,
            kind: CounterKind::Raw,
            expire_on,
        }
    }

    /// Id of the single aggregate document for `key`.
    pub fn aggregate_id(key: &str) -> String {
        format!("counter:aggregate:{key}")
    }
}

/// Key of the daily bucket for `stat` (`succeeded`, `failed`, ...).
pub fn daily_stats_key(stat: &str, at: DateTime<Utc>) -> String {
    format!("stats:{stat}:{}", at.format("%Y-%m-%d"))
}

/// Key of the hourly bucket for `stat`.
pub fn hourly_stats_key(stat: &str, at: DateTime<Utc>) -> String {
    format!("stats:{stat}:{}", at.format("%Y-%m-%d-%H"))
}
