//! Application state shared across every metrics-API request handler.

use std::sync::Arc;

use crate::cache::ReadingCache;
use crate::config::Config;
use crate::registry::PolicyRegistry;

/// Shared state for the external metrics provider's `axum` router.
#[derive(Clone)]
pub struct AppState {
    /// The policy registry published by the Scale Loop Manager.
    pub registry: PolicyRegistry,
    /// The read-through reading cache.
    pub cache: Arc<ReadingCache>,
    /// Shared configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Build application state over a given registry and configuration.
    #[must_use]
    pub fn new(registry: PolicyRegistry, config: Config) -> Self {
        Self {
            registry,
            cache: Arc::new(ReadingCache::new()),
            config: Arc::new(config),
        }
    }
}
