//! Cron time-window trigger. No network I/O — activity is a pure function
//! of the wall clock and two cron expressions marking the active window.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use croner::Cron;
use reflex_core::{
    MetricSpec, MetricTargetType, Reading, SampleContext, SampleOutcome, Scaler, TriggerError,
};

use crate::options::Options;

/// Parsed, validated options for one `cron` trigger.
#[derive(Debug, Clone)]
pub struct CronOptions {
    /// Timezone name, informational only — expressions are evaluated in UTC.
    pub timezone: String,
    /// Cron expression marking the start of the active window.
    pub start: String,
    /// Cron expression marking the end of the active window.
    pub end: String,
    /// Replica count to report as the reading while inside the window.
    pub desired_replicas: f64,
}

/// Parse and validate a `cron` trigger's options.
///
/// # Errors
/// `ConfigError` for missing `start`/`end`/`desiredReplicas`, `EnumError` if
/// either expression fails to parse.
pub fn parse_options(
    trigger_index: usize,
    raw: &HashMap<String, serde_json::Value>,
) -> Result<CronOptions, TriggerError> {
    let opts = Options::new(trigger_index, raw);
    let start = opts.required_str("start")?;
    let end = opts.required_str("end")?;

    for (field, expr) in [("start", &start), ("end", &end)] {
        if Cron::new(expr).parse().is_err() {
            return Err(TriggerError::EnumError {
                trigger_index,
                field: field.to_string(),
                value: expr.clone(),
            });
        }
    }

    Ok(CronOptions {
        timezone: opts.str_or("timezone", "UTC"),
        start,
        end,
        desired_replicas: opts.required_f64("desiredReplicas")?,
    })
}

/// Live cron window scaler.
pub struct CronScaler {
    metric_name: String,
    options: CronOptions,
    start: Cron,
    end: Cron,
}

impl CronScaler {
    /// Build a scaler from validated options.
    ///
    /// # Errors
    /// Propagates a parse failure on either expression — `parse_options`
    /// should already have caught this, so this only fires on a
    /// construction path that bypasses it.
    pub fn new(metric_name: String, options: CronOptions) -> Result<Self, TriggerError> {
        let start = Cron::new(&options.start).parse().map_err(|_| TriggerError::EnumError {
            trigger_index: 0,
            field: "start".to_string(),
            value: options.start.clone(),
        })?;
        let end = Cron::new(&options.end).parse().map_err(|_| TriggerError::EnumError {
            trigger_index: 0,
            field: "end".to_string(),
            value: options.end.clone(),
        })?;
        Ok(Self {
            metric_name,
            options,
            start,
            end,
        })
    }

    /// Walks forward from a two-day lookback to find each schedule's most
    /// recent firing at or before `now`. `croner` only exposes forward
    /// search, so the "most recent occurrence" is found by iterating
    /// forward occurrences until one would land after `now`.
    fn last_occurrence_before(schedule: &Cron, now: chrono::DateTime<Utc>) -> Option<chrono::DateTime<Utc>> {
        let mut cursor = now - chrono::Duration::days(2);
        let mut last = None;
        while let Ok(next) = schedule.find_next_occurrence(&cursor, false) {
            if next > now {
                break;
            }
            last = Some(next);
            cursor = next;
        }
        last
    }

    fn in_window(&self, now: chrono::DateTime<Utc>) -> bool {
        let last_start = Self::last_occurrence_before(&self.start, now);
        let last_end = Self::last_occurrence_before(&self.end, now);
        match (last_start, last_end) {
            (Some(start), Some(end)) => start >= end,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[async_trait]
impl Scaler for CronScaler {
    fn metric_spec(&self) -> Vec<MetricSpec> {
        vec![MetricSpec {
            name: self.metric_name.clone(),
            target: self.options.desired_replicas,
            target_type: MetricTargetType::Value,
        }]
    }

    async fn sample_and_activity(
        &self,
        _ctx: &SampleContext,
    ) -> reflex_core::SampleResult<SampleOutcome> {
        let active = self.in_window(Utc::now());
        let value = if active { self.options.desired_replicas } else { 0.0 };
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
    fn invalid_expression_is_enum_error() {
        let raw = HashMap::from([
            (
                "start".to_string(),
                serde_json::Value::String("not a cron expr".into()),
            ),
            (
                "end".to_string(),
                serde_json::Value::String("0 18 * * *".into()),
            ),
            (
                "desiredReplicas".to_string(),
                serde_json::json!(3),
            ),
        ]);
        assert!(matches!(
            parse_options(0, &raw),
            Err(TriggerError::EnumError { .. })
        ));
    }

    #[test]
    fn valid_expressions_parse() {
        let raw = HashMap::from([
            (
                "start".to_string(),
                serde_json::Value::String("0 8 * * *".into()),
            ),
            (
                "end".to_string(),
                serde_json::Value::String("0 18 * * *".into()),
            ),
            (
                "desiredReplicas".to_string(),
                serde_json::json!(5),
            ),
        ]);
        let opts = parse_options(0, &raw).unwrap();
        assert_eq!(opts.desired_replicas, 5.0);
    }
}
