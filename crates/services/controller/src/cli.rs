//! Command-line surface for the scale controller binary.

use clap::Parser;

/// Event-driven workload autoscaling controller.
#[derive(Debug, Parser)]
#[command(name = "reflex-controller", version, about)]
pub struct Cli {
    /// Log verbosity, passed through to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Namespace to watch for policy objects. Empty means cluster-wide.
    #[arg(long, env = "NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Bind address for the external metrics HTTP server.
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:9022")]
    pub metrics_bind_address: String,

    /// Enable leader election before starting the reconcile loop.
    #[arg(long, env = "LEADER_ELECTION")]
    pub leader_election: bool,

    /// Default deadline, in milliseconds, for a scaler's network call.
    #[arg(long, env = "HTTP_TIMEOUT_MS", default_value_t = 3000)]
    pub http_timeout_ms: u64,
}

impl Cli {
    /// Parse from `std::env::args`, applying `env` fallbacks per field.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
