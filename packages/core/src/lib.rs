//! Document model for the job storage.
//!
//! This crate contains the shared types used across all packages:
//! - Job, State and InvocationData for work items and their history
//! - QueueEntry, Counter, SetEntry, HashEntry, Server and Lock documents
//! - DTOs returned by the monitoring API

mod counter;
mod document;
pub mod dto;
mod job;
mod kv;
mod queue;
mod server;

pub use counter::{
    Counter, CounterKind, DELETED_KEY, SUCCEEDED_KEY, daily_stats_key, hourly_stats_key,
};
pub use document::{DOCUMENT_TABLE, DocumentType, composite_id, new_document_id, now};
pub use job::{InvocationData, InvocationError, Job, JobInvocation, JobState, State, states};
pub use kv::{HashEntry, Lock, RECURRING_JOBS_SET, SetEntry};
pub use queue::{DEFAULT_QUEUE, QueueEntry};
pub use server::{Server, ServerContext};
