//! Lease-based leader election (spec §6's `--leader-election` flag). Only
//! one controller replica may run the reconcile loop at a time; losing the
//! lease is a fatal condition (exit code 2), per spec §6's exit-code table.

use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ControllerError, Result};

/// How long a held lease is valid without renewal before another candidate
/// may claim it.
const LEASE_DURATION: Duration = Duration::from_secs(15);

/// How often the current holder renews its lease.
const RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Backs the `coordination.k8s.io/v1` `Lease` used to elect a single active
/// controller replica.
pub struct Leadership {
    api: Api<Lease>,
    lease_name: String,
    identity: String,
}

impl Leadership {
    /// Build an election over `lease_name` in `namespace`, campaigning under
    /// `identity` (typically the pod name).
    #[must_use]
    pub fn new(client: Client, namespace: &str, lease_name: &str, identity: String) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            lease_name: lease_name.to_string(),
            identity,
        }
    }

    /// Attempt to acquire the lease once, blocking with short retries until
    /// either this identity holds it or an unrecoverable API error occurs.
    ///
    /// # Errors
    /// Returns `ControllerError::Kube` for any API failure other than lock
    /// contention, which is retried rather than surfaced.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            if self.try_claim().await? {
                info!(identity = %self.identity, lease = %self.lease_name, "acquired leader lease");
                return Ok(());
            }
            warn!(identity = %self.identity, lease = %self.lease_name, "lease held by another replica, retrying");
            tokio::time::sleep(RENEW_INTERVAL).await;
        }
    }

    /// Runs the renewal loop until `shutdown` fires or the lease is lost to
    /// another replica.
    ///
    /// # Errors
    /// Returns `ControllerError::LeadershipLost` if renewal fails because
    /// another identity now holds an unexpired lease.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(RENEW_INTERVAL);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = interval.tick() => {
                    if !self.try_claim().await? {
                        return Err(ControllerError::LeadershipLost);
                    }
                }
            }
        }
    }

    /// Reads the lease and claims or renews it if unclaimed, already ours,
    /// or held by an identity whose lease has expired. Returns whether this
    /// identity holds the lease after the call.
    async fn try_claim(&self) -> Result<bool> {
        let now = MicroTime(chrono::Utc::now());
        match self.api.get(&self.lease_name).await {
            Ok(lease) => {
                let spec = lease.spec.unwrap_or_default();
                let held_by_other = spec
                    .holder_identity
                    .as_deref()
                    .is_some_and(|holder| holder != self.identity);
                if held_by_other && !is_expired(&spec, now.0) {
                    return Ok(false);
                }
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": self.identity,
                        "leaseDurationSeconds": LEASE_DURATION.as_secs(),
                        "renewTime": now,
                    }
                });
                self.api
                    .patch(
                        &self.lease_name,
                        &PatchParams::apply("reflex-controller"),
                        &Patch::Merge(&patch),
                    )
                    .await
                    .map_err(ControllerError::Kube)?;
                Ok(true)
            }
            Err(kube::Error::Api(ref api_err)) if api_err.code == 404 => {
                let lease = Lease {
                    metadata: kube::api::ObjectMeta {
                        name: Some(self.lease_name.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.identity.clone()),
                        lease_duration_seconds: Some(
                            i32::try_from(LEASE_DURATION.as_secs()).unwrap_or(i32::MAX),
                        ),
                        renew_time: Some(now),
                        ..Default::default()
                    }),
                };
                self.api
                    .create(&PostParams::default(), &lease)
                    .await
                    .map_err(ControllerError::Kube)?;
                Ok(true)
            }
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }
}

fn is_expired(spec: &LeaseSpec, now: chrono::DateTime<chrono::Utc>) -> bool {
    let Some(renew_time) = &spec.renew_time else {
        return true;
    };
    let duration = spec
        .lease_duration_seconds
        .map_or(LEASE_DURATION, |secs| Duration::from_secs(u64::from(secs.max(0).unsigned_abs())));
    now.signed_duration_since(renew_time.0)
        .to_std()
        .is_ok_and(|elapsed| elapsed > duration)
}
