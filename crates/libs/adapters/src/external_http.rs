//! Generic "HTTP metrics" trigger: fetches a JSON document and extracts one
//! numeric field by a dotted path.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reflex_core::{
    MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome, Scaler, TriggerError,
};
use reqwest::Client;
use serde_json::Value;

use crate::options::Options;

/// Parsed, validated options for one `external-http` trigger.
#[derive(Debug, Clone)]
pub struct ExternalHttpOptions {
    /// URL to GET.
    pub url: String,
    /// Dotted path into the JSON response, e.g. `data.queue.length`.
    pub value_path: String,
    /// Target value compared against the extracted reading.
    pub target: f64,
    /// Target semantics: `value` or `averagevalue`.
    pub target_type: MetricTargetType,
    /// Reading strictly above this activates the trigger.
    pub activation_target: f64,
}

/// Parse and validate an `external-http` trigger's options.
///
/// # Errors
/// `ConfigError` for missing `url`/`valuePath`/`target`; `EnumError` for an
/// unsupported `targetType`.
pub fn parse_options(
    trigger_index: usize,
    raw: &HashMap<String, serde_json::Value>,
) -> Result<ExternalHttpOptions, TriggerError> {
    let opts = Options::new(trigger_index, raw);
    let target_type = match opts.str_or("targetType", "averagevalue").as_str() {
        "value" => MetricTargetType::Value,
        "averagevalue" => MetricTargetType::AverageValue,
        other => {
            return Err(TriggerError::EnumError {
                trigger_index,
                field: "targetType".to_string(),
                value: other.to_string(),
            })
        }
    };
    Ok(ExternalHttpOptions {
        url: opts.required_str("url")?,
        value_path: opts.required_str("valuePath")?,
        target: opts.required_f64("target")?,
        target_type,
        activation_target: opts.f64_or("activationTarget", 0.0),
    })
}

fn extract_path(value: &Value, path: &str) -> Option<f64> {
    let mut cursor = value;
    for segment in path.split('.') {
        cursor = cursor.get(segment)?;
    }
    cursor.as_f64()
}

/// Live generic HTTP-metrics scaler.
pub struct ExternalHttpScaler {
    metric_name: String,
    options: ExternalHttpOptions,
    client: Client,
}

impl ExternalHttpScaler {
    /// Build a scaler from validated options.
    ///
    /// # Errors
    /// Returns a `TriggerError` if the HTTP client fails to construct.
    pub fn new(
        metric_name: String,
        options: ExternalHttpOptions,
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
impl Scaler for ExternalHttpScaler {
    fn metric_spec(&self) -> Vec<MetricSpec> {
        vec![MetricSpec {
            name: self.metric_name.clone(),
            target: self.options.target,
            target_type: self.options.target_type,
        }]
    }

    async fn sample_and_activity(
        &self,
        ctx: &SampleContext,
    ) -> reflex_core::SampleResult<SampleOutcome> {
        let fetch = async {
            let response = self
                .client
                .get(&self.options.url)
                .send()
                .await
                .map_err(|e| reflex_core::SampleError::Transient(e.to_string()))?;

            if !response.status().is_success() {
                return Err(reflex_core::SampleError::Permanent(format!(
                    "external metrics endpoint returned {}",
                    response.status()
                )));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| reflex_core::SampleError::Malformed(e.to_string()))?;

            extract_path(&body, &self.options.value_path).ok_or_else(|| {
                reflex_core::SampleError::Malformed(format!(
                    "path {} not found or not numeric",
                    self.options.value_path
                ))
            })
        };

        let value = reflex_core::scaler::run_cancellable(ctx, fetch).await?;
        let active = value > self.options.activation_target;

        Ok(SampleOutcome {
            readings: vec![Reading { value }],
            active,
        })
    }

    async fn close(&self) -> reflex_core::SampleResult<()> {
        Ok(())
    }
}
