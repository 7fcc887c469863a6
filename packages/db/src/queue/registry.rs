//! Queue provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::JobQueueProvider;
use crate::connection::{DbError, ensure_not_empty};

/// Maps queue names to providers, falling back to a default provider.
#[derive(Clone)]
pub struct QueueProviderRegistry {
    default: Arc<dyn JobQueueProvider>,
    overrides: HashMap<String, Arc<dyn JobQueueProvider>>,
}

impl QueueProviderRegistry {
    /// Create a registry serving every queue with `default`.
    pub fn new(default: Arc<dyn JobQueueProvider>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Serve `queues` with `provider` instead of the default.
    pub fn add<I, S>(&mut self, provider: Arc<dyn JobQueueProvider>, queues: I) -> Result<(), DbError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for queue in queues {
            let queue = queue.into();
            ensure_not_empty(&queue, "queue")?;
            self.overrides.insert(queue, provider.clone());
        }
        Ok(())
    }

    /// The provider serving `queue`.
    pub fn get_provider(&self, queue: &str) -> Result<Arc<dyn JobQueueProvider>, DbError> {
        ensure_not_empty(queue, "queue")?;
        Ok(self
            .overrides
            .get(queue)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }

    /// The single provider serving every one of `queues`.
    ///
    /// Fetching across providers is not supported, so mixed lists are rejected.
    pub fn provider_for_all(&self, queues: &[String]) -> Result<Arc<dyn JobQueueProvider>, DbError> {
        let mut providers = queues.iter().map(|queue| self.get_provider(queue));

        let first = providers
            .next()
            .ok_or_else(|| DbError::InvalidArgument("queues must not be empty".into()))??;

        for provider in providers {
            if !same_provider(&first, &provider?) {
                return Err(DbError::InvalidArgument(format!(
                    "queues {queues:?} are served by different providers"
                )));
            }
        }
        Ok(first)
    }

    /// Every distinct provider, default first.
    pub fn providers(&self) -> Vec<Arc<dyn JobQueueProvider>> {
        let mut providers = vec![self.default.clone()];
        for provider in self.overrides.values() {
            if !providers.iter().any(|known| same_provider(known, provider)) {
                providers.push(provider.clone());
            }
        }
        providers
    }
}

fn same_provider(a: &Arc<dyn JobQueueProvider>, b: &Arc<dyn JobQueueProvider>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
