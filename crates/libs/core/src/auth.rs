//! Trigger authentication: resolving named parameters to secret values and
//! the process-wide resolved-secret cache described in the concurrency model.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

/// Where one authentication parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    /// A literal environment variable on the controller process.
    Env {
        /// Environment variable name.
        name: String,
    },
    /// An orchestrator-managed secret.
    Secret {
        /// Secret object name.
        name: String,
        /// Key within the secret.
        key: String,
    },
    /// A pod-identity provider (workload identity, IRSA-style role
    /// assumption, instance metadata).
    PodIdentity {
        /// Provider tag, e.g. `aws-irsa`, `azure-workload-identity`.
        provider: String,
    },
}

/// One named parameter inside a `TriggerAuthentication` bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEntry {
    /// Parameter name as referenced by adapter options.
    pub param: String,
    /// Where to resolve the value from.
    pub source: AuthSource,
}

/// A name-scoped bundle of authentication parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerAuthentication {
    /// Namespace the bundle lives in.
    pub namespace: String,
    /// Name of the bundle.
    pub name: String,
    /// Resource version, used as a secret-cache invalidation key.
    pub version: String,
    /// The named entries this bundle resolves.
    pub entries: Vec<AuthEntry>,
}

/// Errors raised while resolving authentication parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthResolutionError {
    /// The referenced parameter is not declared in the bundle.
    #[error("parameter {0} not declared in authentication bundle")]
    ParamNotDeclared(String),

    /// The parameter resolved to an empty value.
    #[error("parameter {0} resolved to an empty value")]
    EmptyValue(String),

    /// The underlying source (env var, secret, pod identity) could not be read.
    #[error("failed to read source for parameter {param}: {reason}")]
    SourceUnavailable {
        /// Parameter name.
        param: String,
        /// Human-readable reason.
        reason: String,
    },
}

/// Resolves `AuthSource`s to concrete values. Implementations talk to the
/// orchestrator's secret store, environment, or pod-identity providers.
pub trait SecretResolver: Send + Sync {
    /// Resolve one source to its value.
    ///
    /// # Errors
    /// Returns `AuthResolutionError::SourceUnavailable` if the backing store
    /// cannot be reached or the reference does not exist.
    fn resolve(&self, source: &AuthSource) -> Result<String, AuthResolutionError>;
}

/// Resolves every entry in a bundle, failing the whole resolution if any
/// referenced key is absent or resolves to an empty value, per the
/// authentication invariant in the data model.
///
/// # Errors
/// Returns the first resolution failure encountered.
pub fn resolve_bundle(
    bundle: &TriggerAuthentication,
    resolver: &dyn SecretResolver,
) -> Result<HashMap<String, String>, AuthResolutionError> {
    let mut resolved = HashMap::with_capacity(bundle.entries.len());
    for entry in &bundle.entries {
        let value = resolver.resolve(&entry.source)?;
        if value.is_empty() {
            return Err(AuthResolutionError::EmptyValue(entry.param.clone()));
        }
        resolved.insert(entry.param.clone(), value);
    }
    Ok(resolved)
}

/// Key used to look up an entry in the process-wide resolved-secret cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretCacheKey {
    /// Namespace of the owning `TriggerAuthentication`.
    pub namespace: String,
    /// Name of the owning `TriggerAuthentication`.
    pub name: String,
    /// Resource version at resolution time.
    pub version: String,
}

/// Process-wide cache of resolved authentication bundles, invalidated by the
/// orchestrator watch loop whenever a `TriggerAuthentication` object changes.
///
/// Encapsulated behind an explicit handle (rather than a hidden singleton)
/// so tests can install their own instance.
#[derive(Default)]
pub struct ResolvedSecretCache {
    entries: RwLock<HashMap<SecretCacheKey, HashMap<String, String>>>,
}

impl ResolvedSecretCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a cached resolution, if present and still current for `version`.
    #[must_use]
    pub fn get(&self, key: &SecretCacheKey) -> Option<HashMap<String, String>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    /// Insert or replace a resolution.
    pub fn put(&self, key: SecretCacheKey, resolved: HashMap<String, String>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, resolved);
    }

    /// Drop every cached resolution for a given bundle identity, regardless
    /// of version. Called on the bundle's delete/update watch events.
    pub fn invalidate(&self, namespace: &str, name: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|k, _| !(k.namespace == namespace && k.name == name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeResolver {
        values: HashMap<String, String>,
    }

    impl SecretResolver for FakeResolver {
        fn resolve(&self, source: &AuthSource) -> Result<String, AuthResolutionError> {
            let key = match source {
                AuthSource::Env { name } => name.clone(),
                AuthSource::Secret { name, key } => format!("{name}/{key}"),
                AuthSource::PodIdentity { provider } => provider.clone(),
            };
            self.values
                .get(&key)
                .cloned()
                .ok_or_else(|| AuthResolutionError::SourceUnavailable {
                    param: key.clone(),
                    reason: "not found".into(),
                })
        }
    }

    #[test]
    fn resolves_every_entry() {
        let bundle = TriggerAuthentication {
            namespace: "ns".into(),
            name: "auth".into(),
            version: "1".into(),
            entries: vec![AuthEntry {
                param: "password".into(),
                source: AuthSource::Secret {
                    name: "creds".into(),
                    key: "password".into(),
                },
            }],
        };
        let resolver = FakeResolver {
            values: HashMap::from([("creds/password".to_string(), "hunter2".to_string())]),
        };
        let resolved = resolve_bundle(&bundle, &resolver).unwrap();
        assert_eq!(resolved.get("password").unwrap(), "hunter2");
    }

    #[test]
    fn empty_value_fails_resolution() {
        let bundle = TriggerAuthentication {
            namespace: "ns".into(),
            name: "auth".into(),
            version: "1".into(),
            entries: vec![AuthEntry {
                param: "token".into(),
                source: AuthSource::Env { name: "TOKEN".into() },
            }],
        };
        let resolver = FakeResolver {
            values: HashMap::from([("TOKEN".to_string(), String::new())]),
        };
        assert_eq!(
            resolve_bundle(&bundle, &resolver),
            Err(AuthResolutionError::EmptyValue("token".into()))
        );
    }

    #[test]
    fn cache_invalidate_drops_all_versions() {
        let cache = ResolvedSecretCache::new();
        let key_v1 = SecretCacheKey {
            namespace: "ns".into(),
            name: "auth".into(),
            version: "1".into(),
        };
        cache.put(key_v1.clone(), HashMap::new());
        assert!(cache.get(&key_v1).is_some());
        cache.invalidate("ns", "auth");
        assert!(cache.get(&key_v1).is_none());
    }
}
