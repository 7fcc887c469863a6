//! Actor system for the storage's background maintenance.
//!
//! This crate provides the Ractor-based actors that keep the document store
//! tidy while jobs flow through it.
//!
//! # Architecture
//!
//! - `SweepSupervisor` - Top-level actor that owns one actor per sweep
//! - `SweepActor` - Runs a single sweep on its interval
//! - `CountersAggregator` - Folds raw counters into aggregates
//! - `ExpirationManager` - Deletes expired documents
//!
//! # Usage
//!
//! ```ignore
//! use actors::{SupervisorMessage, SweepKind, start_supervisor};
//!
//! let (supervisor, handle) = start_supervisor(db, options).await?;
//!
//! // Run a sweep right away instead of waiting for its tick
//! let (tx, rx) = actors::concurrency::oneshot();
//! supervisor.send_message(SupervisorMessage::RunSweep { kind: SweepKind::Expiration, reply: tx.into() })?;
//! ```

mod aggregator;
mod expiration;
mod messages;
mod supervisor;
mod sweep;

pub use aggregator::{AGGREGATOR_LOCK, CountersAggregator, aggregate_counters};
pub use expiration::{ExpirationManager, remove_expired};
pub use messages::{SupervisorMessage, SweepKind, SweepMessage};
pub use supervisor::{SupervisorArgs, SweepSupervisor, start_supervisor};
pub use sweep::{Sweep, SweepActor, SweepArgs, SweepFuture};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
