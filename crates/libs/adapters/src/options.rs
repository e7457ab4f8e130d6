//! Helpers for parsing and validating an adapter's free-form option map.
//!
//! Every adapter's `build` walks its options through these helpers so a
//! missing or malformed field always produces the right `TriggerError`
//! variant naming the offending field, per the registry's error contract.

use std::collections::HashMap;

use reflex_core::TriggerError;
use serde_json::Value;

/// A typed, validated view over one trigger's option map.
pub struct Options<'a> {
    trigger_index: usize,
    raw: &'a HashMap<String, Value>,
}

impl<'a> Options<'a> {
    /// Wrap a raw option map for trigger `trigger_index`.
    #[must_use]
    pub const fn new(trigger_index: usize, raw: &'a HashMap<String, Value>) -> Self {
        Self { trigger_index, raw }
    }

    fn missing(&self, field: &str) -> TriggerError {
        TriggerError::ConfigError {
            trigger_index: self.trigger_index,
            field: field.to_string(),
        }
    }

    /// A required string field.
    ///
    /// # Errors
    /// `ConfigError` if absent or not a string.
    pub fn required_str(&self, field: &str) -> Result<String, TriggerError> {
        self.raw
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.missing(field))
    }

    /// An optional string field with a default.
    #[must_use]
    pub fn str_or(&self, field: &str, default: &str) -> String {
        self.raw
            .get(field)
            .and_then(Value::as_str)
            .map_or_else(|| default.to_string(), str::to_string)
    }

    /// A required f64 field.
    ///
    /// # Errors
    /// `ConfigError` if absent or not numeric.
    pub fn required_f64(&self, field: &str) -> Result<f64, TriggerError> {
        self.raw
            .get(field)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.missing(field))
    }

    /// An optional f64 field with a default.
    #[must_use]
    pub fn f64_or(&self, field: &str, default: f64) -> f64 {
        self.raw.get(field).and_then(Value::as_f64).unwrap_or(default)
    }

    /// An optional i64 field with a default.
    #[must_use]
    pub fn i64_or(&self, field: &str, default: i64) -> i64 {
        self.raw.get(field).and_then(Value::as_i64).unwrap_or(default)
    }

    /// An optional bool field with a default.
    #[must_use]
    pub fn bool_or(&self, field: &str, default: bool) -> bool {
        self.raw.get(field).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Validates that `a` and `b` were not both supplied.
    ///
    /// # Errors
    /// `ConflictError` if both are present.
    pub fn reject_conflict(&self, a: &str, b: &str) -> Result<(), TriggerError> {
        if self.raw.contains_key(a) && self.raw.contains_key(b) {
            Err(TriggerError::ConflictError {
                trigger_index: self.trigger_index,
                a: a.to_string(),
                b: b.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// A required string field restricted to `allowed`.
    ///
    /// # Errors
    /// `ConfigError` if absent, `EnumError` if present but not in `allowed`.
    pub fn required_enum(&self, field: &str, allowed: &[&str]) -> Result<String, TriggerError> {
        let value = self.required_str(field)?;
        if allowed.contains(&value.as_str()) {
            Ok(value)
        } else {
            Err(TriggerError::EnumError {
                trigger_index: self.trigger_index,
                field: field.to_string(),
                value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_is_config_error() {
        let raw = HashMap::new();
        let opts = Options::new(2, &raw);
        assert_eq!(
            opts.required_str("host"),
            Err(TriggerError::ConfigError {
                trigger_index: 2,
                field: "host".into()
            })
        );
    }

    #[test]
    fn unsupported_enum_value_is_enum_error() {
        let raw = HashMap::from([("mode".to_string(), Value::String("weird".into()))]);
        let opts = Options::new(0, &raw);
        assert_eq!(
            opts.required_enum("mode", &["a", "b"]),
            Err(TriggerError::EnumError {
                trigger_index: 0,
                field: "mode".into(),
                value: "weird".into(),
            })
        );
    }

    #[test]
    fn conflicting_options_are_conflict_error() {
        let raw = HashMap::from([
            ("a".to_string(), Value::Bool(true)),
            ("b".to_string(), Value::Bool(true)),
        ]);
        let opts = Options::new(1, &raw);
        assert_eq!(
            opts.reject_conflict("a", "b"),
            Err(TriggerError::ConflictError {
                trigger_index: 1,
                a: "a".into(),
                b: "b".into(),
            })
        );
    }
}
