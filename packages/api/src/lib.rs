//! Public surface of the job storage.
//!
//! This crate ties the other packages together:
//! - [`JobStorage`] connects, owns the queue provider registry and starts the
//!   background sweeps
//! - [`StorageConnection`] is the read/write surface used by job processing
//! - [`MonitoringApi`] is the read model behind dashboards and the CLI

mod connection;
mod init;
pub mod monitoring;

pub use connection::{JobData, StateData, StorageConnection};
pub use init::{BackgroundComponents, JobStorage, StorageError};
pub use monitoring::{Granularity, MonitoringApi};

// Re-export the types callers need to talk to the storage
pub use db::queue::{FetchedJob, JobQueueProvider, QueueProviderRegistry};
pub use db::{DbConfig, DbError, DistributedLock, StorageOptions};
pub use jobstore_core::{InvocationData, JobInvocation, JobState, ServerContext, State, dto, states};
pub use tokio_util::sync::CancellationToken;
