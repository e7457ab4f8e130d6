//! Kubernetes workload access: replica-count reads/writes for the deployment
//! path, child-job dispatch for the job path.

pub mod jobs;

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ControllerError, Result};

/// Backoff schedule for optimistic-concurrency retries on a replica-count
/// update, per the deployment path's apply step.
const CONFLICT_BACKOFF: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(200),
    Duration::from_millis(500),
];

/// The replica-count read/write surface the deployment-path handler needs,
/// behind a trait so reconcile logic can be exercised against a fake target
/// in tests rather than a live orchestrator API — the same seam the kafka
/// adapter's `BrokerClient` trait gives its tests.
#[async_trait]
pub trait ReplicaTarget: Send + Sync {
    /// Read the workload's current replica count.
    async fn get_replicas(&self) -> Result<i32>;

    /// Patch the workload's replica count.
    async fn scale(&self, replicas: i32) -> Result<()>;
}

/// Scales a single workload (currently `Deployment`; the scale sub-resource
/// is the same shape for `StatefulSet`) via the orchestrator API.
///
/// Generalizes the reference controller's single, env-configured
/// `DeploymentScaler` to one instance per policy, constructed with whatever
/// `(namespace, name)` the policy's target reference names.
pub struct DeploymentScaler {
    api: Api<Deployment>,
    name: String,
    namespace: String,
}

impl DeploymentScaler {
    /// Build a scaler for `name` in `namespace` from a shared client.
    #[must_use]
    pub fn new(client: Client, namespace: &str, name: String) -> Self {
        let api: Api<Deployment> = Api::namespaced(client, namespace);
        Self {
            api,
            name,
            namespace: namespace.to_string(),
        }
    }

    /// Read the deployment's current replica count.
    ///
    /// # Errors
    /// Returns `ControllerError::TargetNotFound` if the deployment is absent,
    /// otherwise `ControllerError::Kube` for any other API failure.
    pub async fn get_replicas(&self) -> Result<i32> {
        let deployment = self.api.get(&self.name).await.map_err(|e| {
            if matches!(e, kube::Error::Api(ref api_err) if api_err.code == 404) {
                ControllerError::TargetNotFound {
                    kind: "Deployment".to_string(),
                    name: self.name.clone(),
                    namespace: self.namespace.clone(),
                }
            } else {
                ControllerError::Kube(e)
            }
        })?;

        Ok(deployment.spec.and_then(|s| s.replicas).unwrap_or(0))
    }

    /// Verify the target workload exists before starting a poll task.
    ///
    /// # Errors
    /// Returns `ControllerError::Kube` for any API failure other than a
    /// 404, which is reported as `Ok(false)`.
    pub async fn verify_exists(&self) -> Result<bool> {
        match self.api.get(&self.name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ref api_err)) if api_err.code == 404 => {
                warn!(deployment = %self.name, namespace = %self.namespace, "target workload not found");
                Ok(false)
            }
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }

    /// Patch the deployment's replica count, retrying version conflicts with
    /// the bounded backoff from spec §4.C.1 step 6.
    ///
    /// # Errors
    /// Returns `ControllerError::OrchestratorConflict` once every retry is
    /// exhausted, or `ControllerError::Kube` for any non-conflict failure.
    pub async fn scale(&self, replicas: i32) -> Result<()> {
        let patch = json!({ "spec": { "replicas": replicas } });
        let params = PatchParams::apply("reflex-controller");

        let mut attempt = 0;
        loop {
            match self
                .api
                .patch(&self.name, &params, &Patch::Merge(&patch))
                .await
            {
                Ok(_) => {
                    info!(
                        deployment = %self.name,
                        namespace = %self.namespace,
                        replicas,
                        "scaled deployment"
                    );
                    return Ok(());
                }
                Err(kube::Error::Api(ref api_err)) if api_err.code == 409 => {
                    if attempt >= CONFLICT_BACKOFF.len() {
                        return Err(ControllerError::OrchestratorConflict {
                            name: self.name.clone(),
                        });
                    }
                    warn!(
                        deployment = %self.name,
                        attempt,
                        "resourceVersion conflict scaling deployment, retrying"
                    );
                    tokio::time::sleep(CONFLICT_BACKOFF[attempt]).await;
                    attempt += 1;
                }
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }
    }
}

#[async_trait]
impl ReplicaTarget for DeploymentScaler {
    async fn get_replicas(&self) -> Result<i32> {
        Self::get_replicas(self).await
    }

    async fn scale(&self, replicas: i32) -> Result<()> {
        Self::scale(self, replicas).await
    }
}
