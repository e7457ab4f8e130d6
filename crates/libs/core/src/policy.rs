//! The scaling policy data model (deployment and job variants).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifier::identifier;

/// A reference to the replicated workload a deployment-variant policy scales.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRef {
    /// Kind of the referenced workload (e.g. `Deployment`, `StatefulSet`).
    pub kind: String,
    /// Name of the referenced workload.
    pub name: String,
}

/// The job template embedded in a job-variant policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobTemplateRef {
    /// Name used as a prefix for created child jobs.
    pub name_prefix: String,
    /// Opaque pod template payload, forwarded verbatim to the orchestrator.
    pub pod_template: serde_json::Value,
}

/// A reference to a named `TriggerAuthentication` bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerAuthRef {
    /// Namespace the authentication bundle lives in.
    pub namespace: String,
    /// Name of the authentication bundle.
    pub name: String,
}

/// One entry in a policy's trigger list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerSpec {
    /// Stable kind tag, e.g. `rabbitmq`, `kafka`, `cron`.
    pub kind: String,
    /// Free-form option mapping, adapter-specific.
    pub options: HashMap<String, serde_json::Value>,
    /// Optional authentication reference for this trigger.
    pub auth_ref: Option<TriggerAuthRef>,
}

/// Job dispatch strategy tag (job-variant policies only).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScalingStrategy {
    /// `toCreate = min(queueLength, max) - activeJobs`.
    #[default]
    Default,
    /// Deduction and running-job-percentage adjusted variant.
    Custom {
        /// Integer subtracted from the queue length before comparison.
        queue_length_deduction: i64,
        /// Fraction of active jobs that count against the target.
        running_job_percentage: f64,
    },
    /// `toCreate = max(0, queueLength - activeJobs)`, capped at `max - activeJobs`.
    Accurate,
}

/// A deployment-variant scaling policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentPolicy {
    /// Namespace the policy object lives in.
    pub namespace: String,
    /// Name of the policy object.
    pub name: String,
    /// The workload this policy scales.
    pub target_ref: TargetRef,
    /// Ordered trigger list; at least one entry.
    pub triggers: Vec<TriggerSpec>,
    /// Polling interval, defaults to 30s.
    pub polling_interval_secs: u64,
    /// Cooldown period, defaults to 300s.
    pub cooldown_period_secs: i64,
    /// Replica count used instead of `min` once idle, if configured.
    pub idle_replica_count: Option<i32>,
    /// Minimum replica count, defaults to 0.
    pub min_replica_count: i32,
    /// Maximum replica count, defaults to 100.
    pub max_replica_count: i32,
    /// Consecutive failed reads before a trigger's fallback kicks in.
    pub fallback_failure_threshold: u32,
    /// Replica count pinned when all triggers exhaust their fallback budget.
    pub fallback_replicas: Option<i32>,
    /// Snapshot the pre-scaling replica count and restore it on deletion.
    pub restore_original_replicas: bool,
}

/// A job-variant scaling policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPolicy {
    /// Namespace the policy object lives in.
    pub namespace: String,
    /// Name of the policy object.
    pub name: String,
    /// Template used to create child jobs.
    pub job_template: JobTemplateRef,
    /// Ordered trigger list; at least one entry.
    pub triggers: Vec<TriggerSpec>,
    /// Polling interval, defaults to 30s.
    pub polling_interval_secs: u64,
    /// Maximum number of concurrently dispatched jobs.
    pub max_replica_count: i32,
    /// Dispatch strategy.
    pub scaling_strategy: ScalingStrategy,
    /// Number of completed successful jobs to retain.
    pub successful_jobs_history_limit: u32,
    /// Number of completed failed jobs to retain.
    pub failed_jobs_history_limit: u32,
}

/// Either policy variant, keyed the same way for runtime-state lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScalingPolicy {
    /// Deployment-variant policy.
    Deployment(DeploymentPolicy),
    /// Job-variant policy.
    Job(JobPolicy),
}

impl ScalingPolicy {
    /// The stable `kind.namespace.name` identifier for this policy.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Deployment(p) => identifier("scaledobject", &p.namespace, &p.name),
            Self::Job(p) => identifier("scaledjob", &p.namespace, &p.name),
        }
    }

    /// The policy's trigger list, regardless of variant.
    #[must_use]
    pub fn triggers(&self) -> &[TriggerSpec] {
        match self {
            Self::Deployment(p) => &p.triggers,
            Self::Job(p) => &p.triggers,
        }
    }

    /// The policy's configured polling interval.
    #[must_use]
    pub const fn polling_interval_secs(&self) -> u64 {
        match self {
            Self::Deployment(p) => p.polling_interval_secs,
            Self::Job(p) => p.polling_interval_secs,
        }
    }
}

/// A policy failed validation of the invariants in the data model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyValidationError {
    /// `idle` must be strictly less than `min` when `min > 0`.
    #[error("idle replica count {idle} must be < min replica count {min}")]
    IdleNotBelowMin {
        /// Configured idle replica count.
        idle: i32,
        /// Configured minimum replica count.
        min: i32,
    },

    /// `min` must not exceed `max`.
    #[error("min replica count {min} exceeds max replica count {max}")]
    MinExceedsMax {
        /// Configured minimum replica count.
        min: i32,
        /// Configured maximum replica count.
        max: i32,
    },

    /// A negative replica count was configured.
    #[error("replica count must be >= 0, got {0}")]
    NegativeReplicaCount(i32),

    /// The trigger list was empty.
    #[error("policy must declare at least one trigger")]
    NoTriggers,
}

/// Validates the invariants in spec §3: `idle ≤ min ≤ max`, `idle < min` when
/// `min > 0`, `min ≥ 0`, at least one trigger.
pub fn validate_deployment_policy(policy: &DeploymentPolicy) -> Result<(), PolicyValidationError> {
    if policy.triggers.is_empty() {
        return Err(PolicyValidationError::NoTriggers);
    }
    if policy.min_replica_count < 0 {
        return Err(PolicyValidationError::NegativeReplicaCount(
            policy.min_replica_count,
        ));
    }
    if policy.min_replica_count > policy.max_replica_count {
        return Err(PolicyValidationError::MinExceedsMax {
            min: policy.min_replica_count,
            max: policy.max_replica_count,
        });
    }
    if let Some(idle) = policy.idle_replica_count {
        if idle < 0 {
            return Err(PolicyValidationError::NegativeReplicaCount(idle));
        }
        if policy.min_replica_count > 0 && idle >= policy.min_replica_count {
            return Err(PolicyValidationError::IdleNotBelowMin {
                idle,
                min: policy.min_replica_count,
            });
        }
    }
    Ok(())
}

/// Validates the job-variant invariants: `max ≥ 0`, at least one trigger.
pub fn validate_job_policy(policy: &JobPolicy) -> Result<(), PolicyValidationError> {
    if policy.triggers.is_empty() {
        return Err(PolicyValidationError::NoTriggers);
    }
    if policy.max_replica_count < 0 {
        return Err(PolicyValidationError::NegativeReplicaCount(
            policy.max_replica_count,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_policy() -> DeploymentPolicy {
        DeploymentPolicy {
            namespace: "ns1".into(),
            name: "p1".into(),
            target_ref: TargetRef {
                kind: "Deployment".into(),
                name: "worker".into(),
            },
            triggers: vec![TriggerSpec {
                kind: "rabbitmq".into(),
                options: HashMap::new(),
                auth_ref: None,
            }],
            polling_interval_secs: 30,
            cooldown_period_secs: 300,
            idle_replica_count: None,
            min_replica_count: 0,
            max_replica_count: 100,
            fallback_failure_threshold: 3,
            fallback_replicas: None,
            restore_original_replicas: false,
        }
    }

    #[test]
    fn valid_policy_passes() {
        assert!(validate_deployment_policy(&base_policy()).is_ok());
    }

    #[test]
    fn rejects_empty_triggers() {
        let mut p = base_policy();
        p.triggers.clear();
        assert_eq!(
            validate_deployment_policy(&p),
            Err(PolicyValidationError::NoTriggers)
        );
    }

    #[test]
    fn rejects_min_above_max() {
        let mut p = base_policy();
        p.min_replica_count = 50;
        p.max_replica_count = 10;
        assert!(matches!(
            validate_deployment_policy(&p),
            Err(PolicyValidationError::MinExceedsMax { .. })
        ));
    }

    #[test]
    fn rejects_idle_at_or_above_min_when_min_positive() {
        let mut p = base_policy();
        p.min_replica_count = 2;
        p.idle_replica_count = Some(2);
        assert!(matches!(
            validate_deployment_policy(&p),
            Err(PolicyValidationError::IdleNotBelowMin { .. })
        ));
    }

    #[test]
    fn allows_idle_equal_to_min_when_min_is_zero() {
        let mut p = base_policy();
        p.min_replica_count = 0;
        p.idle_replica_count = Some(0);
        assert!(validate_deployment_policy(&p).is_ok());
    }

    #[test]
    fn identifier_is_stable_across_variants() {
        let p = ScalingPolicy::Deployment(base_policy());
        assert_eq!(p.id(), "scaledobject.ns1.p1");
    }
}
