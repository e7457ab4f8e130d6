//! Scale Loop Manager (spec §4.D): owns one cooperative poll task per live
//! policy, rebuilds it on generation change, and restores the snapshotted
//! replica count on delete. Modeled on the reference controller's
//! `Controller::run` ticker-plus-`select!` loop, generalized from one static
//! task to a watch-driven `HashMap<PolicyId, PolicyTask>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::Client;
use reflex_core::{PolicyRuntimeState, Scaler, ScalingPolicy};
use reflex_metrics::registry::{PolicyRegistry, PolicySnapshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::handler::{deployment, job};
use crate::kubernetes::jobs::JobDispatcher;
use crate::kubernetes::DeploymentScaler;
use crate::policy_watch::{self, PolicyChange, PolicyKind, PolicyRecord};
use crate::secrets::SecretStore;
use reflex_adapters::registry::{self, BuildContext};

/// Resolves each trigger's referenced secret into its full key/value map,
/// keyed by trigger index, for publication to the shared policy registry
/// (spec §4.E: "shares A/B with C"). Assumes the secret has already been
/// fetched into `secrets` by the caller.
fn resolved_secrets_by_index(
    secrets: &SecretStore,
    policy: &ScalingPolicy,
) -> HashMap<usize, HashMap<String, String>> {
    policy
        .triggers()
        .iter()
        .enumerate()
        .filter_map(|(index, trigger)| {
            trigger.auth_ref.as_ref().map(|auth_ref| {
                (index, secrets.get_all(&auth_ref.namespace, &auth_ref.name))
            })
        })
        .collect()
}

async fn refresh_secrets(client: &Client, secrets: &SecretStore, policy: &ScalingPolicy) {
    for trigger in policy.triggers() {
        if let Some(auth_ref) = &trigger.auth_ref {
            if let Err(err) = secrets
                .refresh(client.clone(), &auth_ref.namespace, &auth_ref.name)
                .await
            {
                warn!(policy = %policy.id(), secret = %auth_ref.name, error = %err, "failed to refresh trigger authentication secret");
            }
        }
    }
}

struct PolicyTask {
    generation: i64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives the deployment-variant and job-variant policy watches and keeps
/// exactly one poll task alive per policy.
pub struct LoopManager {
    client: Client,
    http_timeout: Duration,
    secrets: Arc<SecretStore>,
    metrics: PolicyRegistry,
    tasks: HashMap<String, PolicyTask>,
}

impl LoopManager {
    /// Build a manager against `client`, resolving trigger authentication
    /// secrets through `secrets`, passing `http_timeout` to every adapter
    /// build, and publishing each live policy's spec and resolved secrets
    /// into `metrics` for the external metrics provider to rebuild scalers
    /// from on demand.
    #[must_use]
    pub fn new(
        client: Client,
        http_timeout: Duration,
        secrets: Arc<SecretStore>,
        metrics: PolicyRegistry,
    ) -> Self {
        Self {
            client,
            http_timeout,
            secrets,
            metrics,
            tasks: HashMap::new(),
        }
    }

    /// Runs both policy watches until `shutdown` fires, then cancels every
    /// live poll task and waits for each to exit before returning.
    pub async fn run(&mut self, namespace: &str, shutdown: CancellationToken) {
        let deployments = policy_watch::watch(self.client.clone(), namespace, PolicyKind::Deployment);
        let jobs = policy_watch::watch(self.client.clone(), namespace, PolicyKind::Job);
        let mut changes = futures::stream::select(deployments, jobs);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("scale loop manager shutting down");
                    break;
                }
                next = changes.next() => {
                    match next {
                        Some(Ok(change)) => self.apply(change).await,
                        Some(Err(err)) => error!(error = %err, "policy watch error"),
                        None => {
                            warn!("policy watch stream ended unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        for (id, task) in self.tasks.drain() {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                warn!(policy = %id, error = %err, "poll task join failed during shutdown");
            }
        }
    }

    async fn apply(&mut self, change: PolicyChange) {
        match change {
            PolicyChange::Upsert(record) => self.upsert(record).await,
            PolicyChange::Removed(id) => self.remove(&id).await,
        }
    }

    /// Starts a task for a never-seen policy; rebuilds it if the generation
    /// changed (a status-only write never reaches here — the watch layer
    /// only reports the spec-bearing object, and the orchestrator's own
    /// generation counter does not advance on status writes); does nothing
    /// otherwise.
    async fn upsert(&mut self, record: PolicyRecord) {
        if let Some(existing) = self.tasks.get(&record.id) {
            if existing.generation == record.generation {
                return;
            }
            let old = self.tasks.remove(&record.id).expect("just checked present");
            old.cancel.cancel();
            if let Err(err) = old.handle.await {
                warn!(policy = %record.id, error = %err, "previous poll task join failed on rebuild");
            }
        }

        refresh_secrets(&self.client, &self.secrets, &record.policy).await;
        self.metrics.upsert(
            record.id.clone(),
            PolicySnapshot {
                policy: record.policy.clone(),
                resolved_secrets: resolved_secrets_by_index(&self.secrets, &record.policy),
            },
        );

        let id = record.id.clone();
        let generation = record.generation;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let client = self.client.clone();
        let http_timeout = self.http_timeout;
        let secrets = Arc::clone(&self.secrets);

        let handle = tokio::spawn(run_policy_task(client, http_timeout, secrets, record, task_cancel));

        self.tasks.insert(id, PolicyTask {
            generation,
            cancel,
            handle,
        });
    }

    async fn remove(&mut self, id: &str) {
        self.metrics.remove(id);
        if let Some(task) = self.tasks.remove(id) {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                warn!(policy = %id, error = %err, "poll task join failed on delete");
            }
        }
    }
}

/// Resolves every trigger's authentication secret (if any), builds its
/// scaler, and returns the live set in trigger order. A trigger whose build
/// fails is dropped with a warning rather than aborting every other
/// trigger's construction, matching the Trigger Adapter Registry's
/// per-trigger error contract (spec §4.A).
async fn refresh_and_build_scalers(
    client: &Client,
    secrets: &SecretStore,
    http_timeout: Duration,
    policy: &ScalingPolicy,
) -> Vec<Box<dyn Scaler>> {
    let policy_kind = match policy {
        ScalingPolicy::Deployment(_) => "scaledobject",
        ScalingPolicy::Job(_) => "scaledjob",
    };

    refresh_secrets(client, secrets, policy).await;
    // Each adapter gets the referenced secret's full key/value map directly
    // as `resolved_secrets`, rather than going through
    // `ControllerSecretResolver`/`resolve_bundle`'s per-parameter
    // `AuthSource` resolution — no separate `TriggerAuthentication` bundle
    // object is modeled here (see DESIGN.md).
    let by_index = resolved_secrets_by_index(secrets, policy);
    let mut scalers = Vec::with_capacity(policy.triggers().len());
    for (trigger_index, trigger) in policy.triggers().iter().enumerate() {
        let resolved_secrets = by_index.get(&trigger_index).cloned().unwrap_or_default();

        let ctx = BuildContext {
            trigger_index,
            policy_kind: policy_kind.to_string(),
            resolved_secrets,
            http_timeout,
        };
        match registry::build(trigger, &ctx) {
            Ok(scaler) => scalers.push(scaler),
            Err(err) => warn!(policy = %policy.id(), trigger_index, error = %err, "trigger failed to build, excluded from this policy's reconciles"),
        }
    }
    scalers
}

/// One policy's cooperative poll loop: non-overlapping ticks (a reconcile
/// still running when the ticker fires is simply not re-entered, since the
/// tick and the reconcile share this one sequential task) until cancelled,
/// then a final restore-to-original write if configured.
async fn run_policy_task(
    client: Client,
    http_timeout: Duration,
    secrets: Arc<SecretStore>,
    record: PolicyRecord,
    cancel: CancellationToken,
) {
    let PolicyRecord {
        id,
        paused,
        policy,
        ..
    } = record;

    let scalers = refresh_and_build_scalers(&client, &secrets, http_timeout, &policy).await;
    let mut state = PolicyRuntimeState::new();
    let mut next_sequence: u64 = 0;

    let mut ticker = tokio::time::interval(Duration::from_secs(policy.polling_interval_secs()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match &policy {
                    ScalingPolicy::Deployment(p) => {
                        let target = DeploymentScaler::new(client.clone(), &p.namespace, p.target_ref.name.clone());
                        if let Err(err) = deployment::reconcile(p, &scalers, &target, &mut state, paused, &cancel).await {
                            warn!(policy = %id, error = %err, "deployment reconcile failed");
                        }
                    }
                    ScalingPolicy::Job(p) => {
                        let dispatcher = JobDispatcher::new(client.clone(), &p.namespace, id.clone());
                        match job::reconcile(p, &scalers, &dispatcher, &mut state, next_sequence, &cancel).await {
                            Ok(sequence) => next_sequence = sequence,
                            Err(err) => warn!(policy = %id, error = %err, "job reconcile failed"),
                        }
                    }
                }
            }
            () = cancel.cancelled() => {
                info!(policy = %id, "poll task cancelled");
                break;
            }
        }
    }

    if let ScalingPolicy::Deployment(p) = &policy {
        if p.restore_original_replicas {
            let target = DeploymentScaler::new(client, &p.namespace, p.target_ref.name.clone());
            if let Err(err) = deployment::restore_original(&target, &state).await {
                warn!(policy = %id, error = %err, "failed to restore original replica count on delete");
            }
        }
    }

    // Every scaler built for this task's lifetime is released on every exit
    // path from the loop above, cancelled or not.
    for scaler in &scalers {
        if let Err(err) = scaler.close().await {
            warn!(policy = %id, error = %err, "scaler failed to release resources on shutdown");
        }
    }
}
