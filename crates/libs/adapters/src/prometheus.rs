//! Prometheus instant-query trigger.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reflex_core::{
    MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome, Scaler, TriggerError,
};
use reqwest::Client;
use serde::Deserialize;

use crate::options::Options;

/// Parsed, validated options for one `prometheus` trigger.
#[derive(Debug, Clone)]
pub struct PrometheusOptions {
    /// Base server address, e.g. `http://prometheus:9090`.
    pub server_address: String,
    /// PromQL query to evaluate.
    pub query: String,
    /// Target value compared against the query result.
    pub threshold: f64,
    /// Reading strictly above this activates the trigger.
    pub activation_threshold: f64,
    /// Whether an empty result vector is treated as `0` rather than an error.
    pub empty_as_zero: bool,
}

/// Parse and validate a `prometheus` trigger's options.
///
/// # Errors
/// `ConfigError` for missing `serverAddress`/`query`/`threshold`.
pub fn parse_options(
    trigger_index: usize,
    raw: &HashMap<String, serde_json::Value>,
) -> Result<PrometheusOptions, TriggerError> {
    let opts = Options::new(trigger_index, raw);
    Ok(PrometheusOptions {
        server_address: opts.required_str("serverAddress")?,
        query: opts.required_str("query")?,
        threshold: opts.required_f64("threshold")?,
        activation_threshold: opts.f64_or("activationThreshold", 0.0),
        empty_as_zero: opts.bool_or("ignoreNullValues", true),
    })
}

#[derive(Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Deserialize)]
struct QueryData {
    result: Vec<QueryResult>,
}

#[derive(Deserialize)]
struct QueryResult {
    value: (f64, String),
}

/// Live Prometheus instant-query scaler.
pub struct PrometheusScaler {
    metric_name: String,
    options: PrometheusOptions,
    client: Client,
}

impl PrometheusScaler {
    /// Build a scaler from validated options.
    ///
    /// # Errors
    /// Returns a `TriggerError` if the HTTP client fails to construct.
    pub fn new(
        metric_name: String,
        options: PrometheusOptions,
        http_timeout: Duration,
    ) -> Result<Self, TriggerError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| TriggerError::ConfigError {
                trigger_index: 0,
                field: format!("http client: {e}"),
            })?;
        Ok(Self {
            metric_name,
            options,
            client,
        })
    }
}

#[async_trait]
impl Scaler for PrometheusScaler {
    fn metric_spec(&self) -> Vec<MetricSpec> {
        vec![MetricSpec {
            name: self.metric_name.clone(),
            target: self.options.threshold,
            target_type: MetricTargetType::Value,
        }]
    }

    async fn sample_and_activity(
        &self,
        ctx: &SampleContext,
    ) -> reflex_core::SampleResult<SampleOutcome> {
        let fetch = async {
            let response = self
                .client
                .get(format!("{}/api/v1/query", self.options.server_address))
                .query(&[("query", self.options.query.as_str())])
                .send()
                .await
                .map_err(|e| reflex_core::SampleError::Transient(e.to_string()))?;

            if !response.status().is_success() {
                return Err(reflex_core::SampleError::Permanent(format!(
                    "prometheus returned {}",
                    response.status()
                )));
            }

            let parsed: QueryResponse = response
                .json()
                .await
                .map_err(|e| reflex_core::SampleError::Malformed(e.to_string()))?;

            match parsed.data.result.first() {
                Some(r) => r
                    .value
                    .1
                    .parse::<f64>()
                    .map_err(|e| reflex_core::SampleError::Malformed(e.to_string())),
                None if self.options.empty_as_zero => Ok(0.0),
                None => Err(reflex_core::SampleError::Malformed(
                    "empty result vector".to_string(),
                )),
            }
        };

        let value = reflex_core::scaler::run_cancellable(ctx, fetch).await?;
        let active = value > self.options.activation_threshold;

        Ok(SampleOutcome {
            readings: vec![Reading { value }],
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

    #[test]
    fn missing_threshold_is_config_error() {
        let raw = HashMap::from([
            (
                "serverAddress".to_string(),
                serde_json::Value::String("http://prom:9090".into()),
            ),
            (
                "query".to_string(),
                serde_json::Value::String("up".into()),
            ),
        ]);
        assert_eq!(
            parse_options(0, &raw),
            Err(TriggerError::ConfigError {
                trigger_index: 0,
                field: "threshold".into()
            })
        );
    }

    #[tokio::test]
    async fn samples_instant_query_result() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/query".into()))
            .with_status(200)
            .with_body(r#"{"data":{"result":[{"value":[0,"17.5"]}]}}"#)
            .create_async()
            .await;

        let options = PrometheusOptions {
            server_address: server.url(),
            query: "sum(rate(http_requests[1m]))".into(),
            threshold: 10.0,
            activation_threshold: 0.0,
            empty_as_zero: true,
        };
        let scaler =
            PrometheusScaler::new("2-http".into(), options, Duration::from_secs(3)).unwrap();
        let ctx = SampleContext::with_deadline(Duration::from_secs(3));
        let outcome = scaler.sample_and_activity(&ctx).await.unwrap();
        assert_eq!(outcome.readings[0].value, 17.5);
        assert!(outcome.active);
    }

    #[tokio::test]
    async fn empty_result_errors_when_not_configured_as_zero() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/query".into()))
            .with_status(200)
            .with_body(r#"{"data":{"result":[]}}"#)
            .create_async()
            .await;

        let options = PrometheusOptions {
            server_address: server.url(),
            query: "absent_metric".into(),
            threshold: 10.0,
            activation_threshold: 0.0,
            empty_as_zero: false,
        };
        let scaler =
            PrometheusScaler::new("2-absent".into(), options, Duration::from_secs(3)).unwrap();
        let ctx = SampleContext::with_deadline(Duration::from_secs(3));
        assert!(scaler.sample_and_activity(&ctx).await.is_err());
    }
}
