//! The `Scaler` capability: the live, per-trigger object the handler samples.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SampleResult;

/// Whether a metric's target is an absolute value or a per-replica average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricTargetType {
    /// `target` is divided across replicas; the reading is compared against
    /// `reading / replicas`.
    AverageValue,
    /// `target` is compared directly against the raw reading.
    Value,
}

/// One metric a scaler exposes. Pure and deterministic from construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    /// Globally unique name, prefixed with the trigger index by the registry.
    pub name: String,
    /// Target value used to derive a desired replica count.
    pub target: f64,
    /// Whether `target` is an average-per-replica or an absolute value.
    pub target_type: MetricTargetType,
}

/// One sampled reading for a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// The metric's current value.
    pub value: f64,
}

/// The result of one `sample_and_activity` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    /// One reading per metric in `metric_spec()`, same order.
    pub readings: Vec<Reading>,
    /// True when at least one reading strictly exceeds the activation
    /// threshold.
    pub active: bool,
}

/// Deadline and cancellation plumbed into every network call a scaler makes.
#[derive(Debug, Clone)]
pub struct SampleContext {
    /// Cancellation token; cancelled on policy delete or process shutdown.
    pub cancellation: CancellationToken,
    /// Soft deadline for the underlying network call.
    pub deadline: Duration,
}

impl SampleContext {
    /// Build a context with a fresh, never-cancelled token.
    #[must_use]
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline,
        }
    }
}

/// A live capability built from one trigger configuration.
///
/// Object-safe so the registry can return `Box<dyn Scaler>` across a closed
/// union of heterogeneous adapter types.
#[async_trait]
pub trait Scaler: Send + Sync {
    /// Describe this scaler's metric(s). Pure; deterministic from
    /// construction.
    fn metric_spec(&self) -> Vec<MetricSpec>;

    /// Fetch current values and the activation flag.
    ///
    /// # Errors
    /// Returns `SampleError::Cancelled` if `ctx.cancellation` fires before
    /// the network call returns; partial reads are never returned.
    async fn sample_and_activity(&self, ctx: &SampleContext) -> SampleResult<SampleOutcome>;

    /// Release any pooled resources (connections, channels). Idempotent.
    ///
    /// # Errors
    /// Returns an error if releasing underlying resources fails; callers
    /// should log and continue rather than treat this as fatal.
    async fn close(&self) -> SampleResult<()>;
}

/// Runs `fut` racing against cancellation, turning a lost race into
/// `SampleError::Cancelled` rather than a partial result.
///
/// # Errors
/// Propagates `fut`'s own error, or returns `SampleError::Cancelled` if the
/// token fires first.
pub async fn run_cancellable<F, T>(
    ctx: &SampleContext,
    fut: F,
) -> SampleResult<T>
where
    F: std::future::Future<Output = SampleResult<T>>,
{
    tokio::select! {
        result = fut => result,
        () = ctx.cancellation.cancelled() => Err(crate::error::SampleError::Cancelled),
    }
}
