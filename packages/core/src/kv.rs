//! Set, hash and lock documents.

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentType, composite_id, now};

/// Set holding the ids of recurring jobs.
pub const RECURRING_JOBS_SET: &str = "recurring-jobs";

/// One member of a (sorted) set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub score: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub expire_on: Option<DateTime<Utc>>,
}

impl SetEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, score: f64) -> Self {
        let key = key.into();
        let value = value.into();
        Self {
            id: Self::member_id(&key, &value),
            document_type: DocumentType::Set,
            key,
            value,
            score,
            expire_on: None,
        }
    }

    /// Deterministic id, so a value is stored at most once per key.
    pub fn member_id(key: &str, value: &str) -> String {
        composite_id("set", &[key, value])
    }
}

/// One field of a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashEntry {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    pub key: String,
    pub field: String,
    pub value: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub expire_on: Option<DateTime<Utc>>,
}

impl HashEntry {
    pub fn new(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let field = field.into();
        Self {
            id: Self::field_id(&key, &field),
            document_type: DocumentType::Hash,
            key,
            field,
            value: value.into(),
            expire_on: None,
        }
    }

    pub fn field_id(key: &str, field: &str) -> String {
        composite_id("hash", &[key, field])
    }
}

/// An advisory lock held on a named resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    pub resource: String,
    /// Random token identifying the holder.
    pub owner: String,
    #[serde(with = "ts_milliseconds")]
    pub created_on: DateTime<Utc>,
    /// Safety net: an orphaned lock stops blocking once this has passed.
    #[serde(with = "ts_milliseconds")]
    pub expire_on: DateTime<Utc>,
}

impl Lock {
    pub fn new(resource: impl Into<String>, owner: impl Into<String>, ttl: chrono::Duration) -> Self {
        let resource = resource.into();
        let created_on = now();
        Self {
            id: Self::resource_id(&resource),
            document_type: DocumentType::Lock,
            resource,
            owner: owner.into(),
            created_on,
            expire_on: created_on + ttl,
        }
    }

    pub fn resource_id(resource: &str) -> String {
        format!("lock:{resource}")
    }
}
