//! The policy registry the provider shares with the Scale Loop Manager
//! (spec §4.E: "it shares A/B with C"). The controller publishes each
//! policy's current spec and resolved trigger secrets here on every
//! upsert/remove; the provider rebuilds a trigger's scaler from the same
//! registry (component A) and `Scaler` contract (component B) on each pull,
//! rather than reaching into the reconcile loop's task-owned instances —
//! those are exclusively owned by their poll task for the lifetime of one
//! reconcile and are not `Send`-shared across the process (see DESIGN.md).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use reflex_core::ScalingPolicy;

/// One policy's published snapshot: its current spec plus each trigger's
/// already-resolved authentication parameters, keyed by trigger index.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    /// The policy as last observed by the watch.
    pub policy: ScalingPolicy,
    /// Resolved secrets per trigger index, mirroring what the reconcile
    /// loop passed to the registry's `build` call for that trigger.
    pub resolved_secrets: HashMap<usize, HashMap<String, String>>,
}

/// Process-wide, concurrently-readable map of live policies, keyed by their
/// stable `kind.namespace.name` identifier.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    inner: Arc<RwLock<HashMap<String, PolicySnapshot>>>,
}

impl PolicyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) a policy's snapshot.
    pub fn upsert(&self, id: String, snapshot: PolicySnapshot) {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, snapshot);
    }

    /// Remove a policy's snapshot, e.g. on delete.
    pub fn remove(&self, id: &str) {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id);
    }

    /// Fetch a policy's current snapshot, if published.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PolicySnapshot> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}
