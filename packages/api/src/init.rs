//! Storage start-up: connection, queue providers and background sweeps.

use std::fmt;
use std::sync::Arc;

use actors::{ActorRef, SupervisorMessage, SweepKind, start_supervisor};
use db::queue::{DocumentQueueProvider, JobQueueProvider, QueueProviderRegistry};
use db::{Database, DbConfig, DbError, StorageOptions};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::connection::StorageConnection;
use crate::monitoring::MonitoringApi;

/// Errors raised while running the storage's background components.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("actor error: {0}")]
    Actor(String),

    #[error("{kind} failed: {message}")]
    Sweep { kind: SweepKind, message: String },
}

/// A job storage backed by SurrealDB.
///
/// Cheap to share behind an `Arc`; connections and monitoring handles are
/// created per use and all share one client.
pub struct JobStorage {
    db: Database,
    config: DbConfig,
    options: Arc<StorageOptions>,
    queues: Arc<QueueProviderRegistry>,
}

impl JobStorage {
    /// Connect, apply the schema and register the document queue as the
    /// default provider.
    pub async fn connect(config: DbConfig, options: StorageOptions) -> Result<Self, DbError> {
        tracing::info!("Initializing job storage...");

        let db = db::init(&config, &options).await?;
        let default_provider = Arc::new(DocumentQueueProvider::new(db.clone(), &options));

        let storage = Self {
            db,
            config,
            options: Arc::new(options),
            queues: Arc::new(QueueProviderRegistry::new(default_provider)),
        };

        tracing::info!("Job storage initialized: {}", storage);
        Ok(storage)
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn queue_providers(&self) -> &QueueProviderRegistry {
        &self.queues
    }

    /// Serve `queues` with a custom provider.
    ///
    /// Connections and monitoring handles created before the call keep the
    /// previous routing.
    pub fn add_queue_provider<I, S>(
        &mut self,
        provider: Arc<dyn JobQueueProvider>,
        queues: I,
    ) -> Result<(), DbError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.queues).add(provider, queues)
    }

    pub fn connection(&self) -> StorageConnection {
        StorageConnection::new(self.db.clone(), self.options.clone(), self.queues.clone())
    }

    pub fn monitoring_api(&self) -> MonitoringApi {
        MonitoringApi::new(self.db.clone(), self.queues.clone())
    }

    /// Start the counters aggregator and the expiration manager.
    pub async fn start_components(&self) -> Result<BackgroundComponents, StorageError> {
        let (supervisor, handle) = start_supervisor(self.db.clone(), (*self.options).clone())
            .await
            .map_err(|e| StorageError::Actor(format!("failed to start sweep supervisor: {e}")))?;

        Ok(BackgroundComponents { supervisor, handle })
    }

    /// Log the effective options once at start-up.
    pub fn write_options_to_log(&self) {
        let options = &self.options;
        tracing::info!("Using the following options for job storage:");
        tracing::info!("    Endpoint: {}", self.config.endpoint);
        tracing::info!("    Namespace: {}", self.config.namespace);
        tracing::info!("    Database: {}", self.config.database);
        tracing::info!("    Request timeout: {:?}", options.request_timeout);
        tracing::info!("    Queue poll interval: {:?}", options.queue_poll_interval);
        tracing::info!("    Counters aggregate interval: {:?}", options.counters_aggregate_interval);
        tracing::info!("    Expiration check interval: {:?}", options.expiration_check_interval);
        tracing::info!("    Queues: {}", options.queues.join(", "));
        tracing::info!("    Lock TTL: {:?}", options.lock_ttl);
        tracing::info!("    Sweep batch size: {}", options.sweep_batch_size);
    }
}

impl fmt::Display for JobStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SurrealDB job storage: {} {}/{}",
            self.config.endpoint, self.config.namespace, self.config.database
        )
    }
}

/// Handle to the running background sweeps.
pub struct BackgroundComponents {
    supervisor: ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
}

impl BackgroundComponents {
    /// Fold raw counters now instead of waiting for the next tick.
    pub async fn run_aggregation_now(&self) -> Result<u64, StorageError> {
        self.run_now(SweepKind::CountersAggregation).await
    }

    /// Delete expired documents now instead of waiting for the next tick.
    pub async fn run_expiration_now(&self) -> Result<u64, StorageError> {
        self.run_now(SweepKind::Expiration).await
    }

    async fn run_now(&self, kind: SweepKind) -> Result<u64, StorageError> {
        let (tx, rx) = actors::concurrency::oneshot();
        self.supervisor
            .send_message(SupervisorMessage::RunSweep { kind, reply: tx.into() })
            .map_err(|e| StorageError::Actor(e.to_string()))?;

        let result = rx
            .await
            .map_err(|_| StorageError::Actor(format!("{kind} did not answer")))?;
        result.map_err(|message| StorageError::Sweep { kind, message })
    }

    /// Stop every sweep and wait for the supervisor to exit.
    pub async fn shutdown(self) -> Result<(), StorageError> {
        tracing::info!("Stopping job storage background components");
        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|e| StorageError::Actor(e.to_string()))?;
        self.handle
            .await
            .map_err(|e| StorageError::Actor(format!("sweep supervisor panicked: {e}")))
    }
}
