//! Policy-object watch (spec §4.D). Modeled on `kube::runtime::watcher`
//! against `DynamicObject` rather than generated CRD types, since code-gen
//! for `ScaledObject`/`ScaledJob` is out of scope (spec.md §1).

use futures::{Stream, StreamExt};
use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind},
    runtime::{watcher, watcher::Event},
    Client,
};
use tracing::warn;

use crate::error::{ControllerError, Result};
use reflex_core::{DeploymentPolicy, JobPolicy, ScalingPolicy};

/// Annotation that force-pauses a policy's loop (spec §4.C.1 step 5). The
/// orchestrator's own status writes never touch this field, so a toggle here
/// is indistinguishable from any other spec change and correctly triggers a
/// generation bump upstream.
pub const PAUSE_ANNOTATION: &str = "reflex.dev/paused";

/// Which declarative object kind a watch is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// `ScaledObject` — deployment-variant policy.
    Deployment,
    /// `ScaledJob` — job-variant policy.
    Job,
}

impl PolicyKind {
    fn group_version_kind(self) -> GroupVersionKind {
        match self {
            Self::Deployment => GroupVersionKind::gvk("reflex.dev", "v1", "ScaledObject"),
            Self::Job => GroupVersionKind::gvk("reflex.dev", "v1", "ScaledJob"),
        }
    }

    fn api_resource(self) -> ApiResource {
        ApiResource::from_gvk(&self.group_version_kind())
    }
}

/// One policy object's parsed spec, plus the generation and pause flag the
/// Scale Loop Manager needs to decide whether to rebuild its poll task.
#[derive(Debug, Clone)]
pub struct PolicyRecord {
    /// Stable `kind.namespace.name` identifier (spec §4.C.3).
    pub id: String,
    /// The object's `metadata.generation`; bumped only on spec changes.
    pub generation: i64,
    /// Whether [`PAUSE_ANNOTATION`] is set to `"true"`.
    pub paused: bool,
    /// The parsed policy.
    pub policy: ScalingPolicy,
}

/// One change the Scale Loop Manager reacts to.
#[derive(Debug, Clone)]
pub enum PolicyChange {
    /// The object was created or its spec changed.
    Upsert(PolicyRecord),
    /// The object identified by this stable id was deleted.
    Removed(String),
}

fn parse_record(kind: PolicyKind, obj: &DynamicObject) -> Option<PolicyRecord> {
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();
    let name = obj.metadata.name.clone()?;
    let generation = obj.metadata.generation.unwrap_or(0);
    let paused = obj
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(PAUSE_ANNOTATION))
        .is_some_and(|v| v == "true");

    let spec = obj.data.get("spec")?.clone();
    let policy = match kind {
        PolicyKind::Deployment => {
            let mut p: DeploymentPolicy = serde_json::from_value(spec).ok()?;
            p.namespace = namespace;
            p.name = name;
            ScalingPolicy::Deployment(p)
        }
        PolicyKind::Job => {
            let mut p: JobPolicy = serde_json::from_value(spec).ok()?;
            p.namespace = namespace;
            p.name = name;
            ScalingPolicy::Job(p)
        }
    };
    let id = policy.id();
    Some(PolicyRecord {
        id,
        generation,
        paused,
        policy,
    })
}

/// Starts a watch over every policy object of `kind` in `namespace` (empty =
/// cluster-wide, per spec §6), yielding one [`PolicyChange`] per observed
/// add/update/delete. An object whose spec fails to parse is logged and
/// skipped rather than failing the whole watch.
pub fn watch(
    client: Client,
    namespace: &str,
    kind: PolicyKind,
) -> impl Stream<Item = Result<PolicyChange>> {
    let api_resource = kind.api_resource();
    let api: Api<DynamicObject> = if namespace.is_empty() {
        Api::all_with(client, &api_resource)
    } else {
        Api::namespaced_with(client, namespace, &api_resource)
    };

    watcher(api, watcher::Config::default()).filter_map(move |event| async move {
        match event {
            Ok(Event::Apply(obj) | Event::InitApply(obj)) => match parse_record(kind, &obj) {
                Some(record) => Some(Ok(PolicyChange::Upsert(record))),
                None => {
                    warn!(name = ?obj.metadata.name, ?kind, "policy object failed to parse, skipping");
                    None
                }
            },
            Ok(Event::Delete(obj)) => {
                let id = parse_record(kind, &obj).map_or_else(
                    || obj.metadata.name.clone().unwrap_or_default(),
                    |record| record.id,
                );
                Some(Ok(PolicyChange::Removed(id)))
            }
            Ok(Event::Init | Event::InitDone) => None,
            Err(err) => Some(Err(ControllerError::Fatal(format!(
                "policy watch stream error: {err}"
            )))),
        }
    })
}
