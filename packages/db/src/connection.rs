//! Database connection management.

use std::future::IntoFuture;
use std::time::Duration;

use serde::de::DeserializeOwned;
use surrealdb::Response;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use thiserror::Error;

/// Raw SurrealDB client handle.
pub type Client = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection mode: "mem://", "rocksdb://path" or a remote endpoint
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use (the "bucket" holding every document)
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobstore".to_string(),
            database: "default".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for file-based persistence.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("file://{}", path.into()),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The caller passed an empty or otherwise invalid argument. Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The store could not be reached or rejected the request.
    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] surrealdb::Error),
    /// The store did not answer within the request timeout.
    #[error("Storage request timed out after {0:?}")]
    Timeout(Duration),
    /// A distributed lock could not be acquired in time.
    #[error("Timed out acquiring lock '{resource}' after {timeout:?}")]
    LockTimeout { resource: String, timeout: Duration },
    #[error("Query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Whether retrying the operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Unavailable(_) | DbError::Timeout(_) | DbError::LockTimeout { .. }
        )
    }
}

/// Fail with [`DbError::InvalidArgument`] when `value` is empty.
pub fn ensure_not_empty(value: &str, name: &str) -> Result<(), DbError> {
    if value.is_empty() {
        return Err(DbError::InvalidArgument(format!("{name} must not be empty")));
    }
    Ok(())
}

/// Cheaply clonable database handle; every operation clones it for its own scope.
#[derive(Clone)]
pub struct Database {
    client: Client,
    request_timeout: Duration,
}

impl Database {
    /// Connect and select the configured namespace and database.
    pub async fn connect(config: &DbConfig, request_timeout: Duration) -> Result<Self, DbError> {
        tracing::info!("Connecting to database: {}", config.endpoint);

        let client = connect(config.endpoint.as_str()).await?;

        // Authenticate if credentials provided
        if let Some((username, password)) = &config.credentials {
            client
                .signin(Root {
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await?;
        }

        client
            .use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        tracing::info!(
            "Connected to database: {}/{}",
            config.namespace,
            config.database
        );

        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Await a store request, bounded by the request timeout.
    pub async fn run<T, F>(&self, request: F) -> Result<T, DbError>
    where
        F: IntoFuture<Output = surrealdb::Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, request.into_future()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DbError::Timeout(self.request_timeout)),
        }
    }
}

/// Take every row of statement `index` from a query response.
pub fn take_rows<T: DeserializeOwned>(response: &mut Response, index: usize) -> Result<Vec<T>, DbError> {
    response
        .take::<Vec<T>>(index)
        .map_err(|e| DbError::Query(e.to_string()))
}

/// Surface the first statement error of a write query.
pub fn check(response: Response) -> Result<Response, DbError> {
    response.check().map_err(|e| DbError::Query(e.to_string()))
}
