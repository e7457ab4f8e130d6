//! Child-job dispatch and history pruning for the job path (spec §4.C.2).

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams, PropagationPolicy},
    Client,
};
use reflex_core::JobTemplateRef;
use tracing::{info, warn};

use crate::error::Result;

/// Label applied to every child job, carrying the owning policy's identity.
const POLICY_LABEL: &str = "reflex.dev/policy-id";
/// Label carrying the monotonic dispatch counter, used to order jobs for
/// history pruning without relying on clock skew between creation
/// timestamps.
const SEQUENCE_LABEL: &str = "reflex.dev/sequence";

/// The child-job read/write surface the job-path handler needs, behind a
/// trait for the same reason `ReplicaTarget` exists on the deployment path:
/// tests exercise the dispatch decision against a fake rather than a live
/// orchestrator API.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Count child jobs that have not yet completed.
    async fn count_active(&self) -> Result<i64>;

    /// Create `count` child jobs from `template`, returning the next unused
    /// sequence number.
    async fn create_jobs(&self, template: &JobTemplateRef, count: i64, next_sequence: u64)
        -> Result<u64>;

    /// Delete completed jobs beyond the configured history limits.
    async fn prune_history(&self, successful_limit: u32, failed_limit: u32) -> Result<()>;
}

/// Creates and prunes child jobs for one job-variant policy.
pub struct JobDispatcher {
    api: Api<Job>,
    policy_id: String,
}

impl JobDispatcher {
    /// Build a dispatcher scoped to `namespace`, tagging every job it
    /// creates with `policy_id`.
    #[must_use]
    pub fn new(client: Client, namespace: &str, policy_id: String) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            policy_id,
        }
    }

    fn label_selector(&self) -> String {
        format!("{POLICY_LABEL}={}", self.policy_id)
    }

    /// Count child jobs that have not yet completed (no `completionTime`
    /// and not marked failed).
    ///
    /// # Errors
    /// Returns `ControllerError::Kube` if the list call fails.
    pub async fn count_active(&self) -> Result<i64> {
        let jobs = self
            .api
            .list(&ListParams::default().labels(&self.label_selector()))
            .await?;

        let active = jobs
            .items
            .iter()
            .filter(|job| !is_completed(job))
            .count();
        Ok(active as i64)
    }

    /// Create `count` child jobs from `template`, each labeled with the
    /// owning policy and a monotonic sequence number starting at
    /// `next_sequence`.
    ///
    /// Creation errors are logged and skipped so partial progress is not
    /// lost, matching the job path's "continue on per-job error" contract.
    ///
    /// # Errors
    /// Returns `ControllerError::Kube` only if listing the starting
    /// sequence fails; individual job-create failures are swallowed.
    pub async fn create_jobs(
        &self,
        template: &JobTemplateRef,
        count: i64,
        next_sequence: u64,
    ) -> Result<u64> {
        let mut sequence = next_sequence;
        for _ in 0..count {
            let name = format!("{}-{sequence}", template.name_prefix);
            let mut labels = BTreeMap::new();
            labels.insert(POLICY_LABEL.to_string(), self.policy_id.clone());
            labels.insert(SEQUENCE_LABEL.to_string(), sequence.to_string());

            let mut job: Job = match serde_json::from_value(serde_json::json!({
                "apiVersion": "batch/v1",
                "kind": "Job",
                "spec": { "template": template.pod_template },
            })) {
                Ok(job) => job,
                Err(err) => {
                    warn!(error = %err, job = %name, "failed to assemble child job from template");
                    sequence += 1;
                    continue;
                }
            };
            job.metadata = ObjectMeta {
                name: Some(name.clone()),
                labels: Some(labels),
                ..ObjectMeta::default()
            };

            match self.api.create(&PostParams::default(), &job).await {
                Ok(_) => info!(job = %name, policy = %self.policy_id, "created child job"),
                Err(err) => warn!(error = %err, job = %name, "failed to create child job"),
            }
            sequence += 1;
        }
        Ok(sequence)
    }

    /// Delete completed jobs beyond the configured history limits, oldest
    /// first, tracked separately for successful and failed outcomes.
    ///
    /// # Errors
    /// Returns `ControllerError::Kube` if listing jobs fails. Individual
    /// delete failures are logged and skipped.
    pub async fn prune_history(
        &self,
        successful_limit: u32,
        failed_limit: u32,
    ) -> Result<()> {
        let jobs = self
            .api
            .list(&ListParams::default().labels(&self.label_selector()))
            .await?;

        let mut successful: Vec<_> = jobs.items.iter().filter(|j| is_succeeded(j)).collect();
        let mut failed: Vec<_> = jobs.items.iter().filter(|j| is_failed(j)).collect();

        successful.sort_by_key(|j| sequence_of(j));
        failed.sort_by_key(|j| sequence_of(j));

        self.delete_excess(&successful, successful_limit as usize)
            .await;
        self.delete_excess(&failed, failed_limit as usize).await;
        Ok(())
    }

    async fn delete_excess(&self, jobs: &[&Job], limit: usize) {
        if jobs.len() <= limit {
            return;
        }
        let excess = jobs.len() - limit;
        for job in &jobs[..excess] {
            if let Some(name) = &job.metadata.name {
                let params = DeleteParams {
                    propagation_policy: Some(PropagationPolicy::Background),
                    ..DeleteParams::default()
                };
                if let Err(err) = self.api.delete(name, &params).await {
                    warn!(error = %err, job = %name, "failed to prune completed job");
                }
            }
        }
    }
}

#[async_trait]
impl JobSink for JobDispatcher {
    async fn count_active(&self) -> Result<i64> {
        Self::count_active(self).await
    }

    async fn create_jobs(
        &self,
        template: &JobTemplateRef,
        count: i64,
        next_sequence: u64,
    ) -> Result<u64> {
        Self::create_jobs(self, template, count, next_sequence).await
    }

    async fn prune_history(&self, successful_limit: u32, failed_limit: u32) -> Result<()> {
        Self::prune_history(self, successful_limit, failed_limit).await
    }
}

fn sequence_of(job: &Job) -> u64 {
    job.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(SEQUENCE_LABEL))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn is_completed(job: &Job) -> bool {
    is_succeeded(job) || is_failed(job)
}

fn is_succeeded(job: &Job) -> bool {
    job.status
        .as_ref()
        .is_some_and(|status| status.succeeded.unwrap_or(0) > 0)
}

fn is_failed(job: &Job) -> bool {
    job.status
        .as_ref()
        .is_some_and(|status| status.failed.unwrap_or(0) > 0)
}
