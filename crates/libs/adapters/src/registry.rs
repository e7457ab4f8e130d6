//! The trigger adapter registry: the closed, compile-time dispatch table
//! from `(trigger-kind, configuration, secrets)` to a live `Scaler`.
//!
//! Adding a new kind is a code change here, never a runtime plugin —
//! per the design note on dynamic dispatch across the full ~60-adapter
//! catalogue, this is the closed tagged union that stands in for the
//! reference system's runtime type assertions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reflex_core::{Scaler, TriggerError, TriggerSpec};

use crate::cron::{self, CronScaler};
use crate::external_http::{self, ExternalHttpScaler};
use crate::kafka::{self, HttpBrokerClient, KafkaScaler};
use crate::prometheus::{self, PrometheusScaler};
use crate::rabbitmq::{self, RabbitMqScaler};
use crate::static_adapter::{self, StaticScaler};

/// Context shared by every adapter build call.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Index of this trigger within the policy's ordered trigger list.
    pub trigger_index: usize,
    /// Kind of the owning policy, used as the metric-name prefix
    /// (`scaledobject` or `scaledjob`).
    pub policy_kind: String,
    /// Parameters already resolved from the trigger's `TriggerAuthentication`
    /// reference, if any.
    pub resolved_secrets: HashMap<String, String>,
    /// Default deadline for the adapter's network calls, absent a
    /// per-trigger override.
    pub http_timeout: Duration,
}

/// Normalizes a trigger's discriminating option into the metric-name suffix:
/// lowercase, with dots and slashes replaced by dashes, per the external
/// interfaces' metric-naming rule.
fn normalize_discriminator(raw: &str) -> String {
    raw.to_lowercase().replace(['.', '/'], "-")
}

/// Builds the globally unique metric name `<policy-kind>-<trigger-index>-<discriminator>`.
fn metric_name(ctx: &BuildContext, discriminator: &str) -> String {
    format!(
        "{}-{}-{}",
        ctx.policy_kind.to_lowercase(),
        ctx.trigger_index,
        normalize_discriminator(discriminator)
    )
}

fn options(spec: &TriggerSpec) -> &HashMap<String, serde_json::Value> {
    &spec.options
}

/// Build a live `Scaler` from one trigger's kind tag and option map.
///
/// # Errors
/// - `ConfigError`/`ConflictError`/`EnumError` — the trigger's own options
///   failed validation.
/// - `UnknownKind` — `spec.kind` is not one of the registry's supported
///   tags.
pub fn build(spec: &TriggerSpec, ctx: &BuildContext) -> Result<Box<dyn Scaler>, TriggerError> {
    match spec.kind.as_str() {
        "rabbitmq" => {
            let opts = rabbitmq::parse_options(ctx.trigger_index, options(spec))?;
            let name = metric_name(ctx, &opts.queue_name);
            let scaler = RabbitMqScaler::new(name, opts, ctx.http_timeout)?;
            Ok(Box::new(scaler))
        }
        "prometheus" => {
            let opts = prometheus::parse_options(ctx.trigger_index, options(spec))?;
            let name = metric_name(ctx, &opts.query);
            let scaler = PrometheusScaler::new(name, opts, ctx.http_timeout)?;
            Ok(Box::new(scaler))
        }
        "cron" => {
            let opts = cron::parse_options(ctx.trigger_index, options(spec))?;
            let name = metric_name(ctx, &format!("{}-{}", opts.start, opts.end));
            let scaler = CronScaler::new(name, opts)?;
            Ok(Box::new(scaler))
        }
        "external-http" => {
            let opts = external_http::parse_options(ctx.trigger_index, options(spec))?;
            let name = metric_name(ctx, &opts.value_path);
            let scaler = ExternalHttpScaler::new(name, opts, ctx.http_timeout)?;
            Ok(Box::new(scaler))
        }
        "static" => {
            let opts = static_adapter::parse_options(ctx.trigger_index, options(spec))?;
            let name = metric_name(ctx, "static");
            Ok(Box::new(StaticScaler::new(name, opts)))
        }
        "kafka" => {
            let opts = kafka::parse_options(ctx.trigger_index, options(spec))?;
            let name = metric_name(ctx, &opts.topic);
            let broker = HttpBrokerClient::new(opts.lag_exporter_url.clone(), ctx.http_timeout)?;
            let scaler = KafkaScaler::new(name, opts, Arc::new(broker));
            Ok(Box::new(scaler))
        }
        other => Err(TriggerError::UnknownKind {
            trigger_index: ctx.trigger_index,
            kind: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(trigger_index: usize) -> BuildContext {
        BuildContext {
            trigger_index,
            policy_kind: "ScaledObject".into(),
            resolved_secrets: HashMap::new(),
            http_timeout: Duration::from_secs(3),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let spec = TriggerSpec {
            kind: "not-a-real-adapter".into(),
            options: HashMap::new(),
            auth_ref: None,
        };
        assert_eq!(
            build(&spec, &ctx(0)),
            Err(TriggerError::UnknownKind {
                trigger_index: 0,
                kind: "not-a-real-adapter".into(),
            })
        );
    }

    #[test]
    fn metric_name_is_prefixed_with_kind_and_index() {
        assert_eq!(
            metric_name(&ctx(2), "My.Queue/Name"),
            "scaledobject-2-my-queue-name"
        );
    }

    #[test]
    fn static_adapter_builds_successfully() {
        let spec = TriggerSpec {
            kind: "static".into(),
            options: HashMap::from([
                ("value".to_string(), serde_json::json!(10.0)),
                ("target".to_string(), serde_json::json!(5.0)),
            ]),
            auth_ref: None,
        };
        let scaler = build(&spec, &ctx(0)).unwrap();
        assert_eq!(scaler.metric_spec()[0].name, "scaledobject-0-static");
    }

    #[test]
    fn missing_required_field_propagates_config_error() {
        let spec = TriggerSpec {
            kind: "rabbitmq".into(),
            options: HashMap::new(),
            auth_ref: None,
        };
        assert_eq!(
            build(&spec, &ctx(4)),
            Err(TriggerError::ConfigError {
                trigger_index: 4,
                field: "host".into(),
            })
        );
    }

    #[test]
    fn kafka_adapter_is_reachable_through_the_registry() {
        let spec = TriggerSpec {
            kind: "kafka".into(),
            options: HashMap::from([
                (
                    "bootstrapServers".to_string(),
                    serde_json::json!("kafka:9092"),
                ),
                ("consumerGroup".to_string(), serde_json::json!("g1")),
                ("topic".to_string(), serde_json::json!("events")),
                (
                    "lagExporterUrl".to_string(),
                    serde_json::json!("http://lag-exporter:8080"),
                ),
            ]),
            auth_ref: None,
        };
        let scaler = build(&spec, &ctx(2)).unwrap();
        assert_eq!(scaler.metric_spec()[0].name, "scaledobject-2-events");
    }
}
