//! API module for the external metrics provider.

pub mod dto;
pub mod handlers;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Create the metrics provider's router: a health check plus the
/// `getMetric`-style pull endpoint external autoscalers poll (spec §4.E).
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/apis/external.metrics/v1beta1/namespaces/:namespace/:metric_name",
            get(handlers::get_metric),
        )
        .with_state(state)
}
