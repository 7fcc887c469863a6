//! Configuration file for the `jobstore` binary.

use std::fs;
use std::path::Path;

use anyhow::Context;
use api::{DbConfig, StorageOptions};
use serde::Deserialize;

/// Contents of a `jobstore.toml` file. Every section is optional.
///
/// ```toml
/// [database]
/// endpoint = "rocksdb://./data/jobstore"
/// database = "production"
///
/// [storage]
/// queue_poll_interval = 5000
/// queues = ["critical", "default"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub database: DatabaseSection,
    pub storage: StorageOptions,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let defaults = DbConfig::default();
        Self {
            endpoint: defaults.endpoint,
            namespace: defaults.namespace,
            database: defaults.database,
            username: None,
            password: None,
        }
    }
}

impl FileConfig {
    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn db_config(&self) -> DbConfig {
        let section = &self.database;
        let config = DbConfig::default()
            .with_endpoint(&section.endpoint)
            .with_namespace(&section.namespace)
            .with_database(&section.database);

        match (&section.username, &section.password) {
            (Some(username), Some(password)) => config.with_credentials(username, password),
            _ => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert_eq!(config.storage, StorageOptions::default());
        assert_eq!(config.db_config().endpoint, "mem://");
        assert!(config.db_config().credentials.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = FileConfig::parse(
            r#"
            [database]
            endpoint = "rocksdb://./data"
            username = "root"
            password = "secret"

            [storage]
            queue_poll_interval = 500
            expiration_check_interval = 60
            queues = ["critical", "default"]
            "#,
        )
        .unwrap();

        let db = config.db_config();
        assert_eq!(db.endpoint, "rocksdb://./data");
        assert_eq!(db.namespace, "jobstore");
        assert_eq!(db.credentials, Some(("root".to_string(), "secret".to_string())));

        assert_eq!(config.storage.queue_poll_interval, Duration::from_millis(500));
        assert_eq!(config.storage.expiration_check_interval, Duration::from_secs(60));
        assert_eq!(config.storage.queues, vec!["critical", "default"]);
        assert_eq!(config.storage.sweep_batch_size, StorageOptions::default().sweep_batch_size);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(FileConfig::parse("[storage]\nqueues = 3").is_err());
    }
}
