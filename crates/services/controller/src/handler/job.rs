//! Job-path dispatch decision (spec §4.C.2). Fallback is deliberately not
//! applied here — spec §9 open question (b) resolves it as "disabled for
//! the job variant" since the source is silent and a pinned replica count
//! has no equivalent meaning for a job-dispatch count.

use std::time::Duration;

use reflex_core::{algorithm, JobPolicy, PolicyRuntimeState, Scaler, ScalingStrategy};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::handler::{gather, GatherOutcome, TriggerContribution};
use crate::kubernetes::jobs::JobSink;

/// Safety margin subtracted from the polling interval when computing each
/// scaler's sample deadline.
const SAFETY_MARGIN: Duration = Duration::from_secs(2);

/// Runs one job-path reconcile: gather readings, count active jobs, compute
/// `toCreate` under the policy's strategy, dispatch, prune history.
///
/// A gather failure (including an exhausted, unconfigured fallback budget)
/// simply skips dispatch for this tick; job creation errors are logged and
/// do not abort the remaining creates or the pruning step.
///
/// # Errors
/// Returns `ControllerError::Kube` if listing active jobs or pruning
/// history fails; individual job-create failures are swallowed.
pub async fn reconcile(
    policy: &JobPolicy,
    scalers: &[Box<dyn Scaler>],
    dispatcher: &dyn JobSink,
    state: &mut PolicyRuntimeState,
    next_sequence: u64,
    cancellation: &CancellationToken,
) -> Result<u64> {
    let deadline = Duration::from_secs(policy.polling_interval_secs).saturating_sub(SAFETY_MARGIN);

    // Fallback is disabled for the job path: a zero threshold means any
    // single failure is immediately "in fallback", and since no fallback
    // replica count is ever configured here, a failing trigger simply
    // skips this tick via `NoFallbackConfigured` below.
    let outcome = gather(scalers, state, 0, false, deadline, cancellation).await;

    let queue_length = match outcome {
        GatherOutcome::NoFallbackConfigured { trigger_index, source } => {
            warn!(policy = %policy.name, trigger_index, error = %source, "trigger failed, skipping job dispatch this tick");
            return Ok(next_sequence);
        }
        GatherOutcome::Normal { contributions, .. } => {
            // The job path never configures a fallback (`gather` is always
            // called with `fallback_configured = false` above), so every
            // present slot here is a fresh reading, never a fallback pin.
            let per_trigger: Vec<i32> = contributions
                .into_iter()
                .zip(scalers.iter())
                .filter_map(|(contribution, scaler)| {
                    let TriggerContribution::Reading(reading) = contribution? else {
                        return None;
                    };
                    let spec = scaler.metric_spec().into_iter().next()?;
                    Some(algorithm::per_trigger_desired(
                        reading,
                        spec.target,
                        spec.target_type,
                    ))
                })
                .collect();
            i64::from(algorithm::aggregate_desired(&per_trigger))
        }
    };

    let active_jobs = dispatcher.count_active().await?;
    let max = i64::from(policy.max_replica_count);

    let to_create = match policy.scaling_strategy {
        ScalingStrategy::Default => algorithm::job_to_create_default(queue_length, active_jobs, max),
        ScalingStrategy::Custom {
            queue_length_deduction,
            running_job_percentage,
        } => algorithm::job_to_create_custom(
            queue_length,
            active_jobs,
            max,
            queue_length_deduction,
            running_job_percentage,
        ),
        ScalingStrategy::Accurate => algorithm::job_to_create_accurate(queue_length, active_jobs, max),
    };

    let next_sequence = if to_create > 0 {
        info!(policy = %policy.name, to_create, active_jobs, queue_length, "dispatching child jobs");
        dispatcher
            .create_jobs(&policy.job_template, to_create, next_sequence)
            .await?
    } else {
        next_sequence
    };

    dispatcher
        .prune_history(
            policy.successful_jobs_history_limit,
            policy.failed_jobs_history_limit,
        )
        .await?;

    Ok(next_sequence)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

    use async_trait::async_trait;
    use reflex_core::{
        JobTemplateRef, MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome,
        TriggerSpec,
    };

    use super::*;

    /// A fixed-reading scaler reporting the queue length directly (`Value`
    /// target type passes the reading through `round()` unchanged).
    struct FakeQueueScaler {
        reading: f64,
    }

    #[async_trait]
    impl Scaler for FakeQueueScaler {
        fn metric_spec(&self) -> Vec<MetricSpec> {
            vec![MetricSpec {
                name: "job-queue".into(),
                target: 1.0,
                target_type: MetricTargetType::Value,
            }]
        }

        async fn sample_and_activity(
            &self,
            _ctx: &SampleContext,
        ) -> reflex_core::SampleResult<SampleOutcome> {
            Ok(SampleOutcome {
                readings: vec![Reading {
                    value: self.reading,
                }],
                active: self.reading > 0.0,
            })
        }

        async fn close(&self) -> reflex_core::SampleResult<()> {
            Ok(())
        }
    }

    /// A scaler whose sample always fails, used to exercise the
    /// skip-this-tick path.
    struct FailingScaler;

    #[async_trait]
    impl Scaler for FailingScaler {
        fn metric_spec(&self) -> Vec<MetricSpec> {
            vec![MetricSpec {
                name: "job-queue".into(),
                target: 1.0,
                target_type: MetricTargetType::Value,
            }]
        }

        async fn sample_and_activity(
            &self,
            _ctx: &SampleContext,
        ) -> reflex_core::SampleResult<SampleOutcome> {
            Err(reflex_core::SampleError::Transient("boom".to_string()))
        }

        async fn close(&self) -> reflex_core::SampleResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeJobSink {
        active: AtomicI64,
        created: AtomicU64,
        pruned: AtomicU32,
    }

    impl FakeJobSink {
        fn with_active(active: i64) -> Self {
            Self {
                active: AtomicI64::new(active),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl JobSink for FakeJobSink {
        async fn count_active(&self) -> Result<i64> {
            Ok(self.active.load(Ordering::SeqCst))
        }

        async fn create_jobs(
            &self,
            _template: &JobTemplateRef,
            count: i64,
            next_sequence: u64,
        ) -> Result<u64> {
            self.created.fetch_add(count as u64, Ordering::SeqCst);
            Ok(next_sequence + count as u64)
        }

        async fn prune_history(&self, _successful_limit: u32, _failed_limit: u32) -> Result<()> {
            self.pruned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn base_policy() -> JobPolicy {
        JobPolicy {
            namespace: "ns1".into(),
            name: "j1".into(),
            job_template: JobTemplateRef {
                name_prefix: "worker".into(),
                pod_template: serde_json::json!({}),
            },
            triggers: vec![TriggerSpec {
                kind: "rabbitmq".into(),
                options: HashMap::new(),
                auth_ref: None,
            }],
            polling_interval_secs: 30,
            max_replica_count: 4,
            scaling_strategy: ScalingStrategy::Default,
            successful_jobs_history_limit: 3,
            failed_jobs_history_limit: 1,
        }
    }

    // spec §8 E4: queue length 7, active jobs 2, max 4 → create 2.
    #[tokio::test]
    async fn e4_default_strategy_dispatches_through_reconcile() {
        let policy = base_policy();
        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FakeQueueScaler { reading: 7.0 })];
        let sink = FakeJobSink::with_active(2);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let next = reconcile(&policy, &scalers, &sink, &mut state, 0, &token)
            .await
            .unwrap();

        assert_eq!(sink.created.load(Ordering::SeqCst), 2);
        assert_eq!(next, 2);
        assert_eq!(sink.pruned.load(Ordering::SeqCst), 1);
    }

    // spec §8 E5: deduction 3, queue length 7, active 1 → create 3.
    #[tokio::test]
    async fn e5_custom_strategy_applies_deduction_through_reconcile() {
        let mut policy = base_policy();
        policy.max_replica_count = 100;
        policy.scaling_strategy = ScalingStrategy::Custom {
            queue_length_deduction: 3,
            running_job_percentage: 1.0,
        };
        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FakeQueueScaler { reading: 7.0 })];
        let sink = FakeJobSink::with_active(1);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let next = reconcile(&policy, &scalers, &sink, &mut state, 10, &token)
            .await
            .unwrap();

        assert_eq!(sink.created.load(Ordering::SeqCst), 3);
        assert_eq!(next, 13);
    }

    // A failing trigger below its (zero) fallback threshold skips dispatch
    // for this tick rather than erroring or creating jobs.
    #[tokio::test]
    async fn failing_trigger_skips_dispatch_this_tick() {
        let policy = base_policy();
        let scalers: Vec<Box<dyn Scaler>> = vec![Box::new(FailingScaler)];
        let sink = FakeJobSink::with_active(0);
        let mut state = PolicyRuntimeState::new();
        let token = CancellationToken::new();

        let next = reconcile(&policy, &scalers, &sink, &mut state, 5, &token)
            .await
            .unwrap();

        assert_eq!(next, 5);
        assert_eq!(sink.created.load(Ordering::SeqCst), 0);
        assert_eq!(sink.pruned.load(Ordering::SeqCst), 0);
    }
}
