//! Configuration for the external metrics provider.

use std::time::Duration;

/// Upper bound on how long a reading may be memoized, per spec §4.E's
/// caching clause (`min(pollingInterval, 30s)`).
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30);

/// Process-wide settings for the metrics HTTP surface. Constructed from the
/// same `reflex-controller` CLI flags that configure the reconcile loop —
/// the provider has no settings of its own beyond the timeout it shares with
/// every scaler build.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default deadline for a scaler's network call, mirroring the
    /// reconcile loop's own adapter timeout.
    pub http_timeout: Duration,
}

impl Config {
    /// Build from the shared HTTP timeout the controller already resolved.
    #[must_use]
    pub const fn new(http_timeout: Duration) -> Self {
        Self { http_timeout }
    }
}
