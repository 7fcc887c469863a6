//! Tunables of the storage back-end.

use std::time::Duration;

use jobstore_core::DEFAULT_QUEUE;
use serde::{Deserialize, Serialize};

/// Storage options.
///
/// Durations are read from configuration files as whole seconds (or
/// milliseconds for the poll interval and request timeout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    #[serde(with = "millis")]
    pub queue_poll_interval: Duration,
    #[serde(with = "secs")]
    pub counters_aggregate_interval: Duration,
    #[serde(with = "secs")]
    pub expiration_check_interval: Duration,
    /// Queue names served by this process.
    pub queues: Vec<String>,
    /// Safety-net lifetime of a distributed lock.
    #[serde(with = "secs")]
    pub lock_ttl: Duration,
    /// Maximum number of documents handled by one sweep step.
    pub sweep_batch_size: usize,
    /// How long discovered queue names are cached by the default monitor.
    #[serde(with = "secs")]
    pub queue_cache_ttl: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            queue_poll_interval: Duration::from_secs(15),
            counters_aggregate_interval: Duration::from_secs(5 * 60),
            expiration_check_interval: Duration::from_secs(30 * 60),
            queues: vec![DEFAULT_QUEUE.to_string()],
            lock_ttl: Duration::from_secs(5 * 60),
            sweep_batch_size: 1000,
            queue_cache_ttl: Duration::from_secs(5),
        }
    }
}

impl StorageOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = interval;
        self
    }

    pub fn with_counters_aggregate_interval(mut self, interval: Duration) -> Self {
        self.counters_aggregate_interval = interval;
        self
    }

    pub fn with_expiration_check_interval(mut self, interval: Duration) -> Self {
        self.expiration_check_interval = interval;
        self
    }

    pub fn with_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_sweep_batch_size(mut self, size: usize) -> Self {
        self.sweep_batch_size = size.max(1);
        self
    }

    pub fn with_queue_cache_ttl(mut self, ttl: Duration) -> Self {
        self.queue_cache_ttl = ttl;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
