//! Kafka consumer-group lag trigger.
//!
//! Speaking the broker's wire protocol directly is out of this crate's
//! scope (and out of its dependency stack); this adapter instead talks to
//! a lag-exporter sidecar (e.g. `kafka-lag-exporter`, Burrow) over the same
//! reqwest-based HTTP pattern every other adapter here uses, through a
//! small `BrokerClient` port so unit tests can substitute a fake broker
//! rather than standing up a real cluster.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reflex_core::{
    MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome, Scaler, TriggerError,
};
use reqwest::Client;
use serde::Deserialize;

use crate::options::Options;

/// Parsed, validated options for one `kafka` trigger.
#[derive(Debug, Clone)]
pub struct KafkaOptions {
    /// Comma-separated bootstrap server list, carried through for context
    /// (logging, metric naming) but not dialed directly by this adapter.
    pub bootstrap_servers: String,
    /// Consumer group to inspect.
    pub consumer_group: String,
    /// Topic to inspect.
    pub topic: String,
    /// Base URL of the lag-exporter sidecar this adapter queries.
    pub lag_exporter_url: String,
    /// Lag per replica before scaling up.
    pub lag_threshold: f64,
    /// Reading strictly above this activates the trigger.
    pub activation_lag_threshold: f64,
}

/// Parse and validate a `kafka` trigger's options.
///
/// # Errors
/// `ConfigError` for missing `bootstrapServers`/`consumerGroup`/`topic`/
/// `lagExporterUrl`.
pub fn parse_options(
    trigger_index: usize,
    raw: &HashMap<String, serde_json::Value>,
) -> Result<KafkaOptions, TriggerError> {
    let opts = Options::new(trigger_index, raw);
    Ok(KafkaOptions {
        bootstrap_servers: opts.required_str("bootstrapServers")?,
        consumer_group: opts.required_str("consumerGroup")?,
        topic: opts.required_str("topic")?,
        lag_exporter_url: opts.required_str("lagExporterUrl")?,
        lag_threshold: opts.f64_or("lagThreshold", 5.0),
        activation_lag_threshold: opts.f64_or("activationLagThreshold", 0.0),
    })
}

/// Narrow port onto a Kafka cluster: total consumer lag across a topic's
/// partitions for one consumer group.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Fetch the total lag for `group` on `topic`.
    ///
    /// # Errors
    /// Returns `SampleError::Transient` on connection failure, `Permanent`
    /// on a broker-reported error (e.g. unknown group), `Malformed` if the
    /// broker's own metadata is inconsistent.
    async fn total_lag(&self, topic: &str, group: &str) -> reflex_core::SampleResult<i64>;
}

#[derive(Deserialize)]
struct LagResponse {
    lag: i64,
}

/// `BrokerClient` backed by a lag-exporter's HTTP API.
pub struct HttpBrokerClient {
    client: Client,
    base_url: String,
}

impl HttpBrokerClient {
    /// Build a client against a lag-exporter base URL.
    ///
    /// # Errors
    /// Returns a `TriggerError` if the HTTP client fails to construct
    /// (malformed TLS config, never in practice with defaults).
    pub fn new(base_url: String, http_timeout: Duration) -> Result<Self, TriggerError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| TriggerError::ConfigError {
                trigger_index: 0,
                field: format!("http client: {e}"),
            })?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn total_lag(&self, topic: &str, group: &str) -> reflex_core::SampleResult<i64> {
        let url = format!(
            "{}/topics/{topic}/groups/{group}/lag",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| reflex_core::SampleError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(reflex_core::SampleError::Permanent(format!(
                "lag exporter returned {}",
                response.status()
            )));
        }

        let body: LagResponse = response
            .json()
            .await
            .map_err(|e| reflex_core::SampleError::Malformed(e.to_string()))?;
        Ok(body.lag)
    }
}

/// Live Kafka consumer-lag scaler.
pub struct KafkaScaler {
    metric_name: String,
    options: KafkaOptions,
    broker: Arc<dyn BrokerClient>,
}

impl KafkaScaler {
    /// Build a scaler over a concrete (or fake) broker client.
    #[must_use]
    pub fn new(metric_name: String, options: KafkaOptions, broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            metric_name,
            options,
            broker,
        }
    }
}

#[async_trait]
impl Scaler for KafkaScaler {
    fn metric_spec(&self) -> Vec<MetricSpec> {
        vec![MetricSpec {
            name: self.metric_name.clone(),
            target: self.options.lag_threshold,
            target_type: MetricTargetType::AverageValue,
        }]
    }

    async fn sample_and_activity(
        &self,
        ctx: &SampleContext,
    ) -> reflex_core::SampleResult<SampleOutcome> {
        let fetch = async {
            let lag = self
                .broker
                .total_lag(&self.options.topic, &self.options.consumer_group)
                .await?;
            Ok(lag as f64)
        };

        let lag = reflex_core::scaler::run_cancellable(ctx, fetch).await?;
        let active = lag > self.options.activation_lag_threshold;

        Ok(SampleOutcome {
            readings: vec![Reading { value: lag }],
            active,
        })
    }

    async fn close(&self) -> reflex_core::SampleResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FakeBroker {
        lag: i64,
    }

    #[async_trait]
    impl BrokerClient for FakeBroker {
        async fn total_lag(&self, _topic: &str, _group: &str) -> reflex_core::SampleResult<i64> {
            Ok(self.lag)
        }
    }

    #[test]
    fn missing_consumer_group_is_config_error() {
        let raw = HashMap::from([
            (
                "bootstrapServers".to_string(),
                serde_json::Value::String("kafka:9092".into()),
            ),
            (
                "topic".to_string(),
                serde_json::Value::String("events".into()),
            ),
        ]);
        assert_eq!(
            parse_options(1, &raw),
            Err(TriggerError::ConfigError {
                trigger_index: 1,
                field: "consumerGroup".into()
            })
        );
    }

    #[tokio::test]
    async fn samples_lag_from_broker() {
        let options = KafkaOptions {
            bootstrap_servers: "kafka:9092".into(),
            consumer_group: "g1".into(),
            topic: "events".into(),
            lag_exporter_url: "http://lag-exporter:8080".into(),
            lag_threshold: 5.0,
            activation_lag_threshold: 0.0,
        };
        let scaler = KafkaScaler::new("1-events".into(), options, Arc::new(FakeBroker { lag: 30 }));
        let ctx = SampleContext::with_deadline(Duration::from_secs(1));
        let outcome = scaler.sample_and_activity(&ctx).await.unwrap();
        assert_eq!(outcome.readings[0].value, 30.0);
        assert!(outcome.active);
    }

    #[tokio::test]
    async fn http_broker_client_fetches_lag_from_exporter() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/topics/events/groups/g1/lag")
            .with_status(200)
            .with_body(r#"{"lag": 120}"#)
            .create_async()
            .await;

        let broker = HttpBrokerClient::new(server.url(), Duration::from_secs(3)).unwrap();
        let lag = broker.total_lag("events", "g1").await.unwrap();
        assert_eq!(lag, 120);
    }

    #[tokio::test]
    async fn http_broker_client_maps_error_status_to_permanent() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/topics/events/groups/g1/lag")
            .with_status(404)
            .create_async()
            .await;

        let broker = HttpBrokerClient::new(server.url(), Duration::from_secs(3)).unwrap();
        let err = broker.total_lag("events", "g1").await.unwrap_err();
        assert!(matches!(err, reflex_core::SampleError::Permanent(_)));
    }
}
