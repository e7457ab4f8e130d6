//! Deployment-path reconcile (spec §4.C.1).

use std::time::Duration;

use chrono::Utc;
use reflex_core::{algorithm, DeploymentPolicy, PolicyRuntimeState, Scaler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ControllerError, Result};
use crate::handler::{gather, GatherOutcome, TriggerContribution};
use crate::kubernetes::ReplicaTarget;

/// Safety margin subtracted from the polling interval when computing each
/// scaler's sample deadline, leaving headroom for the apply step.
const SAFETY_MARGIN: Duration = Duration::from_secs(2);

/// Runs one full deployment-path reconcile: gather, fallback detection,
/// activity rollup, desired-count computation, state transitions, apply.
///
/// # Errors
/// Returns `ControllerError::NoFallbackConfigured` if a trigger has
/// exhausted its fallback budget with none configured (the workload is left
/// untouched), or `ControllerError::Kube`/`OrchestratorConflict` if the
/// replica-count update fails.
pub async fn reconcile(
    policy: &DeploymentPolicy,
    scalers: &[Box<dyn Scaler>],
    target: &dyn ReplicaTarget,
    state: &mut PolicyRuntimeState,
    paused: bool,
    cancellation: &CancellationToken,
) -> Result<()> {
    let current = target.get_replicas().await?;
    state.current_replicas = current;

    if paused {
        state.conditions.paused = true;
        info!(policy = %policy.name, "policy is paused, holding at current replica count");
        return Ok(());
    }
    state.conditions.paused = false;

    let deadline = Duration::from_secs(policy.polling_interval_secs).saturating_sub(SAFETY_MARGIN);

    let outcome = gather(
        scalers,
        state,
        policy.fallback_failure_threshold,
        policy.fallback_replicas.is_some(),
        deadline,
        cancellation,
    )
    .await;

    let desired = match outcome {
        GatherOutcome::NoFallbackConfigured {
            trigger_index,
            source,
        } => {
            state.conditions.ready = false;
            return Err(ControllerError::NoFallbackConfigured {
                trigger_index,
                source,
            });
        }
        GatherOutcome::Normal {
            contributions,
            any_active,
            any_fallback,
        } => {
            state.conditions.ready = true;
            state.conditions.fallback = any_fallback;

            // A trigger that errored this tick but has not yet exhausted its
            // fallback budget is excluded rather than synthesized as zero.
            // If every trigger is in that state, there is no fresh signal at
            // all this tick; hold at `current` rather than let the absence
            // of data read as "inactive" and force an idle scale-down.
            if contributions.iter().all(Option::is_none) {
                return Ok(());
            }

            let per_trigger: Vec<i32> = contributions
                .into_iter()
                .zip(scalers.iter())
                .filter_map(|(contribution, scaler)| match contribution? {
                    TriggerContribution::Reading(reading) => {
                        let spec = scaler.metric_spec().into_iter().next()?;
                        Some(algorithm::per_trigger_desired(
                            reading,
                            spec.target,
                            spec.target_type,
                        ))
                    }
                    // The trigger is pinned in fallback: its own desired
                    // count is the policy's fallback replica count, folded
                    // into the same max-aggregation and clamp as every
                    // other trigger rather than overriding them.
                    TriggerContribution::Fallback => policy.fallback_replicas,
                })
                .collect();

            let now = Utc::now();
            let was_idle = if any_active {
                state.mark_active(now)
            } else {
                state.mark_inactive();
                false
            };
            if was_idle && policy.restore_original_replicas {
                state.snapshot_original_if_absent(current);
            }

            let cooldown_elapsed = state.cooldown_elapsed(now, policy.cooldown_period_secs);

            algorithm::compute_deployment_desired(
                &per_trigger,
                policy.min_replica_count,
                policy.max_replica_count,
                policy.idle_replica_count,
                any_active,
                cooldown_elapsed,
                current,
            )
        }
    };

    if desired == current {
        return Ok(());
    }

    match target.scale(desired).await {
        Ok(()) => {
            state.current_replicas = desired;
            info!(policy = %policy.name, from = current, to = desired, "reconciled desired replica count");
            Ok(())
        }
        Err(err) => {
            warn!(policy = %policy.name, error = %err, "replica-count update failed, will retry next reconcile");
            Err(err)
        }
    }
}

/// A defensive helper only used at policy-delete time: restores the
/// workload to its snapshotted original replica count, per the
/// restore-original-replicas contract (spec §4.C.1 step 5, §9 decision c).
///
/// # Errors
/// Returns `ControllerError::Kube`/`OrchestratorConflict` if the final
/// update fails.
pub async fn restore_original(target: &dyn ReplicaTarget, state: &PolicyRuntimeState) -> Result<()> {
    if let Some(original) = state.original_replica_count {
        target.scale(original).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

    use async_trait::async_trait;
    use reflex_core::{MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome};

    use super::*;

    struct FakeTarget {
        replicas: AtomicI32,
    }

    impl FakeTarget {
        fn new(initial: i32) -> Self {
            Self {
                replicas: AtomicI32::new(initial),
            }
        }
    }

    #[async_trait]
    impl ReplicaTarget for FakeTarget {
        async fn get_replicas(&self) -> Result<i32> {
            Ok(self.replicas.load(Ordering::SeqCst))
        }

        async fn scale(&self, replicas: i32) -> Result<()> {
            self.replicas.store(replicas, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A scaler that fails its first `fail_times` samples, then reports a
    /// fixed reading forever after.
    struct FlakyScaler {
        name: String,
        target: f64,
        reading: f64,
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl Scaler for FlakyScaler {
        fn metric_spec(&self) -> Vec<MetricSpec> {
            vec![MetricSpec {
                name: self.name.clone(),
                target: self.target,
                target_type: MetricTargetType::AverageValue,
            }]
        }

        async fn sample_and_activity(
            &self,
            _ctx: &SampleContext,
        ) -> reflex_core::SampleResult<SampleOutcome> {
            let remaining = self.remaining_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(reflex_core::SampleError::Transient("boom".to_string()));
            }
            Ok(SampleOutcome {
                readings: vec![Reading { value: self.reading }],
                active: self.reading > 0.0,
            })
        }

        async fn close(&self) -> reflex_core::SampleResult<()> {
            Ok(())
        }
    }

    fn base_policy() -> DeploymentPolicy {
        DeploymentPolicy {
            namespace: "ns1".into(),
            name: "p1".into(),
            target_ref: reflex_core::TargetRef {
                kind: "Deployment".into(),
                name: "worker".into(),
            },
            triggers: vec![reflex_core::TriggerSpec {
                kind: "rabbitmq".into(),
                options: std::collections::HashMap::new(),
                auth_ref: None,
            }],
            polling_interval_secs: 30,
            cooldown_period_secs: 300,
            idle_replica_count: Some(0),
            min_replica_count: 0,
            max_replica_count: 10,
            fallback_failure_threshold: 3,
            fallback_replicas: Some(2),
            restore_original_replicas: true,
        }
    }

    // spec §8 E3 / Property 6: fallback.
    #[tokio::test]
    async fn fallback_pins_replicas_after_threshold_failures() {
        let policy = base_policy();
        let target = FakeTarget::new(0);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FlakyScaler {
            name: "scaledobject-0-queue".into(),
            target: 5.0,
            reading: 0.0,
            remaining_failures: AtomicU32::new(10),
        })];

        // The first two failures stay below the threshold: the trigger is
        // excluded from aggregation this tick and the reconcile succeeds
        // with no workload write (no active trigger, cooldown not elapsed).
        for _ in 0..2 {
            let result = reconcile(&policy, &scalers, &target, &mut state, false, &token).await;
            assert!(result.is_ok());
            assert!(!state.conditions.fallback);
        }
        // Third failure exhausts the threshold with a fallback configured:
        // the handler pins the workload rather than erroring.
        let result = reconcile(&policy, &scalers, &target, &mut state, false, &token).await;
        assert!(result.is_ok());
        assert_eq!(target.get_replicas().await.unwrap(), 2);
        assert!(state.conditions.fallback);
    }

    // Property 2/3: a trigger pinned in fallback contributes its fallback
    // count as one input to the max-aggregation rather than overriding the
    // policy's other, healthy trigger.
    #[tokio::test]
    async fn fallback_trigger_still_aggregates_with_healthy_triggers() {
        let policy = base_policy();
        let target = FakeTarget::new(0);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let scalers: Vec<Box<dyn Scaler>> = vec![
            Box::new(FlakyScaler {
                name: "scaledobject-0-queue".into(),
                target: 5.0,
                reading: 0.0,
                remaining_failures: AtomicU32::new(1000),
            }),
            Box::new(FlakyScaler {
                name: "scaledobject-1-queue".into(),
                target: 5.0,
                reading: 35.0,
                remaining_failures: AtomicU32::new(0),
            }),
        ];

        for _ in 0..3 {
            reconcile(&policy, &scalers, &target, &mut state, false, &token)
                .await
                .unwrap();
        }

        // Trigger 0 is pinned at its fallback count (2); trigger 1 is
        // healthy and wants ceil(35/5) = 7. The aggregated desired count is
        // the max of the two, not the bare fallback pin.
        assert!(state.conditions.fallback);
        assert_eq!(target.get_replicas().await.unwrap(), 7);
    }

    // Property 2: the fallback pin is clamped like any other contribution,
    // not applied as a bypass of min/max.
    #[tokio::test]
    async fn fallback_pin_is_still_clamped_to_max() {
        let mut policy = base_policy();
        policy.fallback_replicas = Some(50);

        let target = FakeTarget::new(0);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FlakyScaler {
            name: "scaledobject-0-queue".into(),
            target: 5.0,
            reading: 0.0,
            remaining_failures: AtomicU32::new(1000),
        })];

        for _ in 0..3 {
            reconcile(&policy, &scalers, &target, &mut state, false, &token)
                .await
                .unwrap();
        }

        assert_eq!(target.get_replicas().await.unwrap(), policy.max_replica_count);
    }

    #[tokio::test]
    async fn no_fallback_configured_leaves_workload_untouched() {
        let mut policy = base_policy();
        policy.fallback_replicas = None;
        let target = FakeTarget::new(3);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FlakyScaler {
            name: "scaledobject-0-queue".into(),
            target: 5.0,
            reading: 0.0,
            remaining_failures: AtomicU32::new(10),
        })];

        for _ in 0..2 {
            let result = reconcile(&policy, &scalers, &target, &mut state, false, &token).await;
            assert!(result.is_ok());
        }
        // Third failure exhausts the threshold with no fallback configured:
        // the whole reconcile fails and the workload is left untouched.
        let result = reconcile(&policy, &scalers, &target, &mut state, false, &token).await;
        assert!(matches!(
            result,
            Err(ControllerError::NoFallbackConfigured { trigger_index: 0, .. })
        ));
        assert_eq!(target.get_replicas().await.unwrap(), 3);
    }

    // spec §8 E6 / Property 7: restore-original.
    #[tokio::test]
    async fn restore_original_restores_snapshotted_count() {
        let policy = base_policy();
        let target = FakeTarget::new(3);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FlakyScaler {
            name: "scaledobject-0-queue".into(),
            target: 5.0,
            reading: 25.0,
            remaining_failures: AtomicU32::new(0),
        })];

        // Activation snapshots the original count (3) before scaling up.
        reconcile(&policy, &scalers, &target, &mut state, false, &token)
            .await
            .unwrap();
        assert_eq!(state.original_replica_count, Some(3));

        // Policy deleted while idle at 0; restore should bring it back to 3.
        target.scale(0).await.unwrap();
        restore_original(&target, &state).await.unwrap();
        assert_eq!(target.get_replicas().await.unwrap(), 3);
    }

    // Property 8: a pre-cancelled token surfaces as an error, not a
    // workload write.
    #[tokio::test]
    async fn cancellation_produces_no_workload_write() {
        let policy = base_policy();
        let target = FakeTarget::new(0);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();
        token.cancel();

        struct NeverReturns;
        #[async_trait]
        impl Scaler for NeverReturns {
            fn metric_spec(&self) -> Vec<MetricSpec> {
                vec![MetricSpec {
                    name: "scaledobject-0-queue".into(),
                    target: 5.0,
                    target_type: MetricTargetType::AverageValue,
                }]
            }

            async fn sample_and_activity(
                &self,
                ctx: &SampleContext,
            ) -> reflex_core::SampleResult<SampleOutcome> {
                reflex_core::scaler::run_cancellable(
                    ctx,
                    std::future::pending::<reflex_core::SampleResult<SampleOutcome>>(),
                )
                .await
            }

            async fn close(&self) -> reflex_core::SampleResult<()> {
                Ok(())
            }
        }

        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(NeverReturns)];
        let result = reconcile(&policy, &scalers, &target, &mut state, false, &token).await;
        // A cancelled sample does not count toward fallback and there is no
        // fallback to pin to, so the trigger is simply excluded this tick —
        // no reading means no aggregation contribution and no workload write.
        assert!(result.is_ok());
        assert_eq!(target.get_replicas().await.unwrap(), 0);
    }
}
