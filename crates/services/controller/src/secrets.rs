//! Resolves `TriggerAuthentication` bundles against the orchestrator's
//! secret store and the controller process's own environment.

use std::collections::HashMap;
use std::sync::RwLock;

use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, Client};
use reflex_core::auth::{AuthResolutionError, AuthSource, SecretResolver};
use tracing::warn;

/// Fetches and caches the raw key/value contents of orchestrator secrets so
/// the synchronous `SecretResolver` contract can be satisfied without
/// blocking on network I/O mid-resolution.
#[derive(Default)]
pub struct SecretStore {
    fetched: RwLock<HashMap<(String, String), HashMap<String, String>>>,
}

impl SecretStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or re-fetch) a secret's contents from the orchestrator and
    /// cache it under `(namespace, name)`.
    ///
    /// # Errors
    /// Returns `kube::Error` if the secret cannot be read.
    pub async fn refresh(&self, client: Client, namespace: &str, name: &str) -> kube::Result<()> {
        let api: Api<Secret> = Api::namespaced(client, namespace);
        let secret = api.get(name).await?;
        let mut decoded = HashMap::new();
        if let Some(data) = secret.data {
            for (key, value) in data {
                match String::from_utf8(value.0) {
                    Ok(s) => {
                        decoded.insert(key, s);
                    }
                    Err(_) => warn!(secret = %name, key = %key, "secret value is not valid UTF-8, skipping"),
                }
            }
        }
        self.fetched
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((namespace.to_string(), name.to_string()), decoded);
        Ok(())
    }

    fn get(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.fetched
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// The full key/value contents of a pre-fetched secret, used as the
    /// trigger's `resolved_secrets` map for the registry build step. Empty
    /// if the secret has not been fetched (or does not exist).
    #[must_use]
    pub fn get_all(&self, namespace: &str, name: &str) -> HashMap<String, String> {
        self.fetched
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// The controller's `SecretResolver`: env vars read directly, orchestrator
/// secrets read from a pre-fetched `SecretStore`, pod-identity providers
/// resolved from a provider-named environment variable as a stand-in for a
/// real workload-identity/IRSA exchange (documented in `DESIGN.md`).
pub struct ControllerSecretResolver<'a> {
    /// Namespace the owning `TriggerAuthentication` bundle lives in, used to
    /// scope `Secret` lookups.
    pub namespace: &'a str,
    /// Pre-fetched secret contents.
    pub store: &'a SecretStore,
}

impl SecretResolver for ControllerSecretResolver<'_> {
    fn resolve(&self, source: &AuthSource) -> Result<String, AuthResolutionError> {
        match source {
            AuthSource::Env { name } => std::env::var(name).map_err(|_| {
                AuthResolutionError::SourceUnavailable {
                    param: name.clone(),
                    reason: "environment variable not set".to_string(),
                }
            }),
            AuthSource::Secret { name, key } => {
                self.store.get(self.namespace, name, key).ok_or_else(|| {
                    AuthResolutionError::SourceUnavailable {
                        param: key.clone(),
                        reason: format!("secret {name}/{key} not found or not yet fetched"),
                    }
                })
            }
            AuthSource::PodIdentity { provider } => {
                let env_name = format!("{}_TOKEN", provider.to_uppercase().replace('-', "_"));
                std::env::var(&env_name).map_err(|_| AuthResolutionError::SourceUnavailable {
                    param: provider.clone(),
                    reason: format!("pod-identity provider {provider} has no token in {env_name}"),
                })
            }
        }
    }
}

