//! HTTP request handlers for the external metrics provider.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use reflex_adapters::registry::{self, BuildContext};
use reflex_core::{identifier, ScalingPolicy, SampleContext};

use crate::api::dto::{GetMetricResponse, HealthResponse};
use crate::config::MAX_CACHE_TTL;
use crate::error::{ProviderError, Result};
use crate::state::AppState;

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "reflex-metrics".to_string(),
    })
}

/// Parse a Kubernetes-style label selector (`k1=v1,k2=v2`) into a map.
/// Malformed segments (no `=`, or an empty key) are dropped rather than
/// rejected; an unmatched segment simply fails to resolve a policy later.
fn parse_selector(selector: &str) -> HashMap<String, String> {
    selector
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Serve one `getMetric` pull (spec §4.E): resolve the policy addressed by
/// the selector, rebuild the trigger that exposes `metric_name`, and sample
/// it, going through the read-through cache first.
///
/// # Errors
/// `PolicyNotFound` if the selector doesn't address a published policy,
/// `MetricNotFound` if none of its triggers expose `metric_name`, or the
/// scaler's own build/sample error otherwise.
pub async fn get_metric(
    State(state): State<AppState>,
    Path((namespace, metric_name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<GetMetricResponse>> {
    let labels = params
        .get("selector")
        .map(|s| parse_selector(s))
        .unwrap_or_default();
    let kind = labels
        .get("reflex.dev/kind")
        .map(String::as_str)
        .unwrap_or("scaledobject");
    let name = labels
        .get("reflex.dev/name")
        .ok_or_else(|| ProviderError::PolicyNotFound(metric_name.clone()))?;
    let policy_id = identifier(kind, &namespace, name);

    if let Some(value) = state.cache.get(&policy_id, &metric_name) {
        return Ok(Json(GetMetricResponse {
            metric_name,
            value,
            timestamp: Utc::now(),
        }));
    }

    let snapshot = state
        .registry
        .get(&policy_id)
        .ok_or_else(|| ProviderError::PolicyNotFound(policy_id.clone()))?;
    let policy_kind = match &snapshot.policy {
        ScalingPolicy::Deployment(_) => "scaledobject",
        ScalingPolicy::Job(_) => "scaledjob",
    };

    let mut matched = None;
    for (trigger_index, trigger) in snapshot.policy.triggers().iter().enumerate() {
        let resolved_secrets = snapshot
            .resolved_secrets
            .get(&trigger_index)
            .cloned()
            .unwrap_or_default();
        let ctx = BuildContext {
            trigger_index,
            policy_kind: policy_kind.to_string(),
            resolved_secrets,
            http_timeout: state.config.http_timeout,
        };
        let scaler = registry::build(trigger, &ctx)?;
        if scaler
            .metric_spec()
            .iter()
            .any(|spec| spec.name == metric_name)
        {
            matched = Some(scaler);
            break;
        }
    }
    let scaler = matched.ok_or_else(|| ProviderError::MetricNotFound(metric_name.clone()))?;

    let sample_ctx = SampleContext::with_deadline(Duration::from_secs(10));
    let outcome = scaler.sample_and_activity(&sample_ctx).await?;
    let value = outcome.readings.first().map_or(0.0, |reading| reading.value);

    let ttl = Duration::from_secs(snapshot.policy.polling_interval_secs()).min(MAX_CACHE_TTL);
    state.cache.put(&policy_id, &metric_name, value, ttl);

    Ok(Json(GetMetricResponse {
        metric_name,
        value,
        timestamp: Utc::now(),
    }))
}
