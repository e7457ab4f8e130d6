//! Resolved runtime configuration for the scale controller.

use std::time::Duration;

use crate::cli::Cli;

/// Process-wide configuration, resolved once at startup from CLI flags
/// (which themselves fall back to environment variables).
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace scope to watch. Empty means cluster-wide.
    pub namespace: String,
    /// Bind address for the external metrics HTTP server.
    pub metrics_bind_address: String,
    /// Whether leader election is enabled.
    pub leader_election: bool,
    /// Default deadline for a scaler's network call, absent a per-trigger
    /// override.
    pub http_timeout: Duration,
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            namespace: cli.namespace.clone(),
            metrics_bind_address: cli.metrics_bind_address.clone(),
            leader_election: cli.leader_election,
            http_timeout: Duration::from_millis(cli.http_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_timeout_millis_to_duration() {
        let cli = Cli {
            log_level: "info".into(),
            namespace: String::new(),
            metrics_bind_address: "0.0.0.0:9022".into(),
            leader_election: false,
            http_timeout_ms: 1500,
        };
        let config = Config::from(&cli);
        assert_eq!(config.http_timeout, Duration::from_millis(1500));
    }
}
