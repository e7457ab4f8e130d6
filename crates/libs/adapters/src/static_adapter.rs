//! Fixed-reading adapter used by tests and documentation examples, the same
//! role the reference controller's own unit tests fill with a literal
//! `QueueMetricsResponse` fixture.

use std::collections::HashMap;

use async_trait::async_trait;
use reflex_core::{
    MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome, Scaler, TriggerError,
};

use crate::options::Options;

/// Parsed, validated options for one `static` trigger.
#[derive(Debug, Clone)]
pub struct StaticOptions {
    /// The fixed reading this scaler always returns.
    pub value: f64,
    /// Target compared against `value`.
    pub target: f64,
    /// Reading strictly above this activates the trigger.
    pub activation_target: f64,
}

/// Parse and validate a `static` trigger's options.
///
/// # Errors
/// `ConfigError` for missing `value`/`target`.
pub fn parse_options(
    trigger_index: usize,
    raw: &HashMap<String, serde_json::Value>,
) -> Result<StaticOptions, TriggerError> {
    let opts = Options::new(trigger_index, raw);
    Ok(StaticOptions {
        value: opts.required_f64("value")?,
        target: opts.required_f64("target")?,
        activation_target: opts.f64_or("activationTarget", 0.0),
    })
}

/// A scaler that always reports the same fixed reading.
pub struct StaticScaler {
    metric_name: String,
    options: StaticOptions,
}

impl StaticScaler {
    /// Build a scaler from validated options.
    #[must_use]
    pub const fn new(metric_name: String, options: StaticOptions) -> Self {
        Self {
            metric_name,
            options,
        }
    }
}

#[async_trait]
impl Scaler for StaticScaler {
    fn metric_spec(&self) -> Vec<MetricSpec> {
        vec![MetricSpec {
            name: self.metric_name.clone(),
            target: self.options.target,
            target_type: MetricTargetType::AverageValue,
        }]
    }

    async fn sample_and_activity(
        &self,
        _ctx: &SampleContext,
    ) -> reflex_core::SampleResult<SampleOutcome> {
        Ok(SampleOutcome {
            readings: vec![Reading {
                value: self.options.value,
            }],
            active: self.options.value > self.options.activation_target,
        })
    }

    async fn close(&self) -> reflex_core::SampleResult<()> {
        Ok(())
    }
}
