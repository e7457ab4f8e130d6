//! Error types for the external metrics provider.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur serving a `getMetric` pull.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The selector's policy identity does not match any watched policy.
    #[error("policy {0} not found")]
    PolicyNotFound(String),

    /// No scaler for the addressed policy exposes the requested metric name.
    #[error("metric {0} not found")]
    MetricNotFound(String),

    /// The trigger exists but failed to build into a live scaler.
    #[error("trigger build failed: {0}")]
    Trigger(#[from] reflex_core::TriggerError),

    /// The scaler sample itself failed.
    #[error("sample failed: {0}")]
    Sample(#[from] reflex_core::SampleError),
}

/// Error response body, matching the reference workspace's `ErrorResponse`
/// shape.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::PolicyNotFound(_) | Self::MetricNotFound(_) => StatusCode::NOT_FOUND,
            Self::Trigger(_) => StatusCode::BAD_REQUEST,
            Self::Sample(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
