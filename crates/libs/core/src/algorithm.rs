//! Pure decision functions for both scaling paths.
//!
//! Kept free of I/O and of the wall clock so every branch in spec §4.C is a
//! plain, table-tested function — the direct descendant of the reference
//! controller's single-trigger `calculate_desired_replicas`, generalized to
//! N triggers, deployment-or-job, fallback and idle/cooldown overrides.

use crate::scaler::MetricTargetType;

/// `Di` for one trigger: `ceil(reading / target)` for `AverageValue`,
/// `round(reading)` for `Value`. A non-positive target is a configuration
/// degenerate case and yields `0`, letting the caller's clamp step fall back
/// to `min`.
#[must_use]
pub fn per_trigger_desired(reading: f64, target: f64, target_type: MetricTargetType) -> i32 {
    match target_type {
        MetricTargetType::AverageValue => {
            if target <= 0.0 {
                0
            } else {
                (reading / target).ceil() as i32
            }
        }
        MetricTargetType::Value => reading.round() as i32,
    }
}

/// The policy-level desired count: the max across all per-trigger desireds,
/// matching the orchestrator's own multi-metric semantics. Empty input (no
/// scalers at all) yields `0`.
#[must_use]
pub fn aggregate_desired(per_trigger: &[i32]) -> i32 {
    per_trigger.iter().copied().max().unwrap_or(0)
}

/// Clamp `value` into `[min, max]`.
#[must_use]
pub fn clamp(value: i32, min: i32, max: i32) -> i32 {
    value.clamp(min, max)
}

/// The deployment-path desired replica count for one reconcile.
///
/// - If any trigger is active, the desired count is the clamped aggregation
///   across all triggers' readings.
/// - If no trigger is active and the cooldown has elapsed, the policy scales
///   to `idle` (overriding `min`) or, absent an idle value, to `min`.
/// - If no trigger is active but the cooldown has not elapsed, the desired
///   count holds at `current` — this is what keeps a policy "pinned" at its
///   last active value for the duration of the cooldown window.
#[must_use]
pub fn compute_deployment_desired(
    per_trigger: &[i32],
    min: i32,
    max: i32,
    idle: Option<i32>,
    any_active: bool,
    cooldown_elapsed: bool,
    current: i32,
) -> i32 {
    if any_active {
        return clamp(aggregate_desired(per_trigger), min, max);
    }
    if cooldown_elapsed {
        return idle.unwrap_or_else(|| clamp(min, min, max));
    }
    current
}

/// `toCreate` under the `default` job-dispatch strategy:
/// `min(queueLength, max) - activeJobs`, floored at zero.
#[must_use]
pub fn job_to_create_default(queue_length: i64, active_jobs: i64, max: i64) -> i64 {
    (queue_length.min(max) - active_jobs).max(0)
}

/// `toCreate` under the `custom` strategy: `queueLength` is first reduced by
/// `deduction`, and only `floor(running_pct * activeJobs)` running jobs count
/// against the target.
#[must_use]
pub fn job_to_create_custom(
    queue_length: i64,
    active_jobs: i64,
    max: i64,
    deduction: i64,
    running_pct: f64,
) -> i64 {
    let effective_queue = (queue_length - deduction).max(0);
    let counting_jobs = (running_pct * active_jobs as f64).floor() as i64;
    (effective_queue.min(max) - counting_jobs).max(0)
}

/// `toCreate` under the `accurate` strategy: `max(0, queueLength -
/// activeJobs)`, never exceeding `max - activeJobs`.
#[must_use]
pub fn job_to_create_accurate(queue_length: i64, active_jobs: i64, max: i64) -> i64 {
    let raw = (queue_length - active_jobs).max(0);
    raw.min((max - active_jobs).max(0))
}
