//! Per-policy runtime state held in memory by the scale loop manager and
//! reflected into the policy's status sub-object.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// The policy's status condition vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conditions {
    /// Scalers were built successfully and the last reconcile did not error.
    pub ready: bool,
    /// At least one trigger reported `active = true` on the last reconcile.
    pub active: bool,
    /// At least one trigger is currently substituting its fallback reading.
    pub fallback: bool,
    /// The well-known pause annotation is set.
    pub paused: bool,
}

/// Runtime state for one policy, generalizing the reference controller's
/// single-trigger `ScalerState` to N triggers with fallback tracking.
#[derive(Debug, Clone)]
pub struct PolicyRuntimeState {
    /// Last time any non-fallback trigger reported active.
    pub last_active_time: Option<DateTime<Utc>>,
    /// Replica count snapshotted the first time the policy scales to idle,
    /// when `restore_original_replicas` is set.
    pub original_replica_count: Option<i32>,
    /// Consecutive-failure counter per trigger index.
    trigger_failures: HashMap<usize, u32>,
    /// Current status condition vector.
    pub conditions: Conditions,
    /// Current replica count as last observed from the workload.
    pub current_replicas: i32,
}

impl PolicyRuntimeState {
    /// A freshly constructed state: no activity observed yet, `Ready` clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_active_time: None,
            original_replica_count: None,
            trigger_failures: HashMap::new(),
            conditions: Conditions::default(),
            current_replicas: 0,
        }
    }

    /// Record a successful sample for `trigger_index`, clearing its failure
    /// counter.
    pub fn record_trigger_success(&mut self, trigger_index: usize) {
        self.trigger_failures.remove(&trigger_index);
    }

    /// Record a failed sample for `trigger_index`, returning the updated
    /// consecutive-failure count.
    pub fn record_trigger_failure(&mut self, trigger_index: usize) -> u32 {
        let counter = self.trigger_failures.entry(trigger_index).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Whether `trigger_index` has failed at least `threshold` consecutive
    /// times and should fall back.
    #[must_use]
    pub fn is_in_fallback(&self, trigger_index: usize, threshold: u32) -> bool {
        self.trigger_failures
            .get(&trigger_index)
            .is_some_and(|count| *count >= threshold)
    }

    /// Update `last_active_time` to `now` and return whether this is a
    /// transition out of idle (i.e. the policy was not already active).
    pub fn mark_active(&mut self, now: DateTime<Utc>) -> bool {
        let was_idle = !self.conditions.active;
        self.last_active_time = Some(now);
        self.conditions.active = true;
        was_idle
    }

    /// Mark the policy inactive on this reconcile. Does not touch
    /// `last_active_time` — cooldown is measured from the last time it was
    /// active, not from "now".
    pub fn mark_inactive(&mut self) {
        self.conditions.active = false;
    }

    /// Whether the cooldown period has elapsed since the policy was last
    /// active. A policy that has never been active has its cooldown already
    /// elapsed.
    #[must_use]
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, cooldown_secs: i64) -> bool {
        match self.last_active_time {
            None => true,
            Some(last) => (now - last).num_seconds() >= cooldown_secs,
        }
    }

    /// Snapshot `current` as the original replica count if none is recorded
    /// yet. Called once, before the first scale-up out of idle, when
    /// `restore_original_replicas` is set.
    pub fn snapshot_original_if_absent(&mut self, current: i32) {
        if self.original_replica_count.is_none() {
            self.original_replica_count = Some(current);
        }
    }
}

impl Default for PolicyRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn never_active_has_cooldown_elapsed() {
        let state = PolicyRuntimeState::new();
        assert!(state.cooldown_elapsed(Utc::now(), 300));
    }

    #[test]
    fn cooldown_not_elapsed_immediately_after_activity() {
        let mut state = PolicyRuntimeState::new();
        let now = Utc::now();
        state.mark_active(now);
        assert!(!state.cooldown_elapsed(now + ChronoDuration::seconds(10), 300));
    }

    #[test]
    fn cooldown_elapsed_after_enough_time() {
        let mut state = PolicyRuntimeState::new();
        let now = Utc::now();
        state.mark_active(now);
        assert!(state.cooldown_elapsed(now + ChronoDuration::seconds(301), 300));
    }

    #[test]
    fn fallback_triggers_after_threshold() {
        let mut state = PolicyRuntimeState::new();
        assert!(!state.is_in_fallback(0, 3));
        state.record_trigger_failure(0);
        state.record_trigger_failure(0);
        assert!(!state.is_in_fallback(0, 3));
        state.record_trigger_failure(0);
        assert!(state.is_in_fallback(0, 3));
    }

    #[test]
    fn one_success_clears_the_counter() {
        let mut state = PolicyRuntimeState::new();
        state.record_trigger_failure(0);
        state.record_trigger_failure(0);
        state.record_trigger_failure(0);
        assert!(state.is_in_fallback(0, 3));
        state.record_trigger_success(0);
        assert!(!state.is_in_fallback(0, 3));
    }

    #[test]
    fn snapshot_only_captured_once() {
        let mut state = PolicyRuntimeState::new();
        state.snapshot_original_if_absent(5);
        state.snapshot_original_if_absent(9);
        assert_eq!(state.original_replica_count, Some(5));
    }

    #[test]
    fn mark_active_reports_idle_transition() {
        let mut state = PolicyRuntimeState::new();
        let now = Utc::now();
        assert!(state.mark_active(now));
        assert!(!state.mark_active(now));
    }
}
