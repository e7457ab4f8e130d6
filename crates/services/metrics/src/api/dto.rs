//! Data transfer objects for the external metrics API.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single `getMetric` pull's response (spec §4.E).
#[derive(Debug, Serialize)]
pub struct GetMetricResponse {
    /// The requested metric name, echoed back.
    pub metric_name: String,
    /// The current reading.
    pub value: f64,
    /// When this response was produced.
    pub timestamp: DateTime<Utc>,
}

/// Health-check response, matching the reference workspace's shape.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
}
