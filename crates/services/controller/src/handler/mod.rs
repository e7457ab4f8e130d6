//! The Scale Handler (spec §4.C): per-policy reconcile executor for both the
//! deployment and job dispatch paths.

pub mod deployment;
pub mod job;

use std::sync::Arc;
use std::time::Duration;

use reflex_core::{PolicyRuntimeState, Reading, SampleContext, SampleError, Scaler};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Upper bound on concurrently in-flight scaler samples for one reconcile,
/// per the concurrency model's fan-out cap.
const MAX_CONCURRENT_SAMPLES: usize = 32;

/// One trigger's outcome for this reconcile: either a fresh reading plus
/// activation flag, or the reason sampling failed.
enum TriggerOutcome {
    Sampled { reading: f64, active: bool },
    Failed(SampleError),
}

/// Samples every scaler concurrently (bounded at
/// [`MAX_CONCURRENT_SAMPLES`]), feeding each trigger's consecutive-failure
/// counter in `state` as results come back.
///
/// Assumes each scaler exposes exactly one metric, matching the adapter set
/// this workspace implements; a multi-metric scaler would need its readings
/// reduced before being handed back here.
async fn sample_all(
    scalers: &[Box<dyn Scaler>],
    state: &mut PolicyRuntimeState,
    deadline: Duration,
    cancellation: &CancellationToken,
) -> Vec<TriggerOutcome> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SAMPLES));
    let mut tasks = Vec::with_capacity(scalers.len());

    for scaler in scalers {
        let ctx = SampleContext {
            cancellation: cancellation.clone(),
            deadline,
        };
        let permit = Arc::clone(&semaphore);
        tasks.push(async move {
            let _permit = permit
                .acquire_owned()
                .await
                .expect("sample semaphore is never closed");
            scaler.sample_and_activity(&ctx).await
        });
    }

    let results = futures::future::join_all(tasks).await;

    results
        .into_iter()
        .enumerate()
        .map(|(trigger_index, result)| match result {
            Ok(outcome) => {
                state.record_trigger_success(trigger_index);
                let reading = outcome
                    .readings
                    .first()
                    .map_or(0.0, |r: &Reading| r.value);
                TriggerOutcome::Sampled {
                    reading,
                    active: outcome.active,
                }
            }
            Err(err) => {
                if err.counts_toward_fallback() {
                    state.record_trigger_failure(trigger_index);
                } else {
                    warn!(trigger_index, "sample cancelled");
                }
                TriggerOutcome::Failed(err)
            }
        })
        .collect()
}

/// One trigger's contribution to this reconcile's per-trigger desired list.
#[derive(Debug, Clone, Copy)]
pub enum TriggerContribution {
    /// A fresh metric reading, to be run through
    /// `algorithm::per_trigger_desired` against that trigger's metric spec.
    Reading(f64),
    /// This trigger exhausted its fallback budget; its per-trigger desired
    /// count is pinned directly to the policy's fallback replica count
    /// rather than derived from a reading, then folded into the same
    /// aggregation and clamp every other trigger goes through.
    Fallback,
}

/// The policy-level rollup of one reconcile's gather step, before the
/// per-path desired-count computation.
pub enum GatherOutcome {
    /// Every trigger either sampled successfully, is pinned in fallback, or
    /// is below its fallback threshold; `contributions` lines up 1:1 with
    /// the live scalers, `None` for a trigger that errored this tick
    /// without yet exhausting its fallback budget (excluded from
    /// aggregation, not treated as active).
    Normal {
        /// One contribution per live scaler, in trigger order.
        contributions: Vec<Option<TriggerContribution>>,
        /// Whether any trigger reported active, including a trigger pinned
        /// in fallback this tick.
        any_active: bool,
        /// Whether any trigger is currently pinned in fallback.
        any_fallback: bool,
    },
    /// A trigger exhausted its fallback threshold with no fallback
    /// configured; the reconcile must not mutate the workload this tick.
    NoFallbackConfigured {
        /// Index of the trigger that failed without a fallback.
        trigger_index: usize,
        /// The error from its last sample.
        source: SampleError,
    },
}

/// Runs the gather + fallback-detection + activity-rollup steps shared by
/// both dispatch paths (spec §4.C.1 steps 1–3, §4.C.2 step 1).
///
/// A trigger that exhausts its fallback budget does not short-circuit the
/// policy: its slot is filled with [`TriggerContribution::Fallback`] so the
/// caller can fold it into the same aggregation-then-clamp pipeline every
/// other trigger's reading goes through.
pub async fn gather(
    scalers: &[Box<dyn Scaler>],
    state: &mut PolicyRuntimeState,
    fallback_threshold: u32,
    fallback_configured: bool,
    deadline: Duration,
    cancellation: &CancellationToken,
) -> GatherOutcome {
    let outcomes = sample_all(scalers, state, deadline, cancellation).await;

    let mut contributions = Vec::with_capacity(outcomes.len());
    let mut any_active = false;
    let mut any_fallback = false;

    for (trigger_index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            TriggerOutcome::Sampled { reading, active } => {
                contributions.push(Some(TriggerContribution::Reading(reading)));
                any_active |= active;
            }
            TriggerOutcome::Failed(err) => {
                if state.is_in_fallback(trigger_index, fallback_threshold) {
                    if fallback_configured {
                        contributions.push(Some(TriggerContribution::Fallback));
                        any_active = true;
                        any_fallback = true;
                        continue;
                    }
                    return GatherOutcome::NoFallbackConfigured {
                        trigger_index,
                        source: err,
                    };
                }
                contributions.push(None);
            }
        }
    }

    GatherOutcome::Normal {
        contributions,
        any_active,
        any_fallback,
    }
}
