//! Job and state documents.

use std::collections::HashMap;

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::document::{DocumentType, new_document_id, now};

/// Well-known state names.
pub mod states {
    pub const ENQUEUED: &str = "Enqueued";
    pub const PROCESSING: &str = "Processing";
    pub const SCHEDULED: &str = "Scheduled";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const DELETED: &str = "Deleted";
    pub const AWAITING: &str = "Awaiting";
}

/// Errors raised while turning stored invocation data back into a call descriptor.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("invocation data has no type name")]
    MissingType,
    #[error("invocation data has no method name")]
    MissingMethod,
    #[error("malformed {field}: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected {expected} arguments, found {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },
}

/// Serialized method + type descriptor of a job.
///
/// `parameter_types` and `arguments` are JSON arrays encoded as strings. The
/// argument payload is opaque to the storage layer; it only has to round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationData {
    pub type_name: String,
    pub method: String,
    pub parameter_types: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl InvocationData {
    /// Encode a call descriptor.
    pub fn new(
        type_name: impl Into<String>,
        method: impl Into<String>,
        parameter_types: Vec<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            method: method.into(),
            parameter_types: Value::from(parameter_types).to_string(),
            arguments: Some(Value::Array(arguments).to_string()),
        }
    }

    /// Decode the call descriptor, validating the argument payload against the
    /// parameter list.
    pub fn deserialize(&self) -> Result<JobInvocation, InvocationError> {
        if self.type_name.is_empty() {
            return Err(InvocationError::MissingType);
        }
        if self.method.is_empty() {
            return Err(InvocationError::MissingMethod);
        }

        let parameter_types: Vec<String> = serde_json::from_str(&self.parameter_types)
            .map_err(|source| InvocationError::Malformed {
                field: "parameter types",
                source,
            })?;

        let args: Vec<Value> = match self.arguments.as_deref() {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(raw).map_err(|source| InvocationError::Malformed {
                    field: "arguments",
                    source,
                })?
            }
            _ => Vec::new(),
        };

        if args.len() != parameter_types.len() {
            return Err(InvocationError::ArgumentCountMismatch {
                expected: parameter_types.len(),
                actual: args.len(),
            });
        }

        Ok(JobInvocation {
            type_name: self.type_name.clone(),
            method: self.method.clone(),
            parameter_types,
            args,
        })
    }
}

/// A decoded job invocation, as shown by the monitoring views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInvocation {
    pub type_name: String,
    pub method: String,
    pub parameter_types: Vec<String>,
    pub args: Vec<Value>,
}

impl std::fmt::Display for JobInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method)
    }
}

/// A job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    /// Invocation descriptor with the arguments stripped out.
    pub invocation_data: InvocationData,
    arguments: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub created_on: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub expire_on: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job with no state yet.
    pub fn new(mut invocation: InvocationData, parameters: HashMap<String, String>) -> Self {
        let arguments = invocation.arguments.take().unwrap_or_else(|| "[]".into());
        Self {
            id: new_document_id(),
            document_type: DocumentType::Job,
            invocation_data: invocation,
            arguments,
            parameters,
            state_name: None,
            state_id: None,
            created_on: now(),
            expire_on: None,
        }
    }

    /// Set the expiration timestamp.
    pub fn with_expire_on(mut self, expire_on: DateTime<Utc>) -> Self {
        self.expire_on = Some(expire_on);
        self
    }

    /// The full invocation data with the stored arguments merged back in.
    pub fn invocation(&self) -> InvocationData {
        InvocationData {
            arguments: Some(self.arguments.clone()),
            ..self.invocation_data.clone()
        }
    }
}

/// A new state to apply to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobState {
    pub name: String,
    pub reason: Option<String>,
    pub data: HashMap<String, String>,
}

impl JobState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// An append-only state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(rename = "doc_id")]
    pub id: String,
    pub document_type: DocumentType,
    pub job_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(with = "ts_milliseconds")]
    pub created_on: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_milliseconds_option"
    )]
    pub expire_on: Option<DateTime<Utc>>,
}

impl State {
    /// Build the document recording `state` for `job_id`.
    pub fn new(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            id: new_document_id(),
            document_type: DocumentType::State,
            job_id: job_id.into(),
            name: state.name,
            reason: state.reason,
            data: state.data,
            created_on: now(),
            expire_on: None,
        }
    }
}
