//! Error types for the scale controller service.

use thiserror::Error;

/// Errors that can occur in the scale controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// HTTP request error (adapter network calls that escape to the
    /// reconcile boundary).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A trigger failed to build into a live scaler.
    #[error("trigger build failed: {0}")]
    Trigger(#[from] reflex_core::TriggerError),

    /// A scaler sample failed and no fallback was configured for that
    /// trigger.
    #[error("trigger {trigger_index} has no fallback configured and is failing: {source}")]
    NoFallbackConfigured {
        /// Index of the failing trigger.
        trigger_index: usize,
        /// Underlying sample error.
        source: reflex_core::SampleError,
    },

    /// Configuration error, surfaced on the `Ready=false` condition.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target workload referenced by a deployment-variant policy does
    /// not exist.
    #[error("target {kind} {name} not found in namespace {namespace}")]
    TargetNotFound {
        /// Target workload kind.
        kind: String,
        /// Target workload name.
        name: String,
        /// Target workload namespace.
        namespace: String,
    },

    /// A replica-count update hit `resourceVersion` conflicts on every retry.
    #[error("exhausted retries updating replica count for {name} after optimistic concurrency conflicts")]
    OrchestratorConflict {
        /// Name of the workload being updated.
        name: String,
    },

    /// Leader election was lost; the process should exit with code 2.
    #[error("leader election lost")]
    LeadershipLost,

    /// A fatal condition (object store unreachable beyond the backoff
    /// ceiling); the supervisor should restart the process.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
