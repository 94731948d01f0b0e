// Metrics endpoint

use crate::core::error::ApiError;
use crate::core::state::AppState;
use crate::metrics::collector::MetricsSnapshot;
use crate::security::credentials::{app_key_from_headers, verify_app_key};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use std::sync::Arc;
use tracing::warn;

/// Authorization outcomes, login and reconciliation counters, store sizes
/// and uptime.
///
/// Requires the application key in the X-Credentials header.
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    let authorized = app_key_from_headers(&headers)
        .is_some_and(|key| verify_app_key(key, &state.config.auth.app_key));

    if !authorized {
        warn!("Unauthorized metrics access attempt");
        return Err(ApiError::InvalidAppKey);
    }

    Ok(Json(state.metrics.get_snapshot(state.gauges())))
}
