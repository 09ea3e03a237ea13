//! Prometheus metrics endpoint
//!
//! Served outside signature verification so scrapers need not sign.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::metrics::{KEY_CACHE_ENTRIES, REGISTRY};

/// GET /metrics
///
/// Refreshes the key cache gauge, then renders the registry in text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    if let Some(cache) = &state.key_cache {
        let stats = cache.stats().await;
        KEY_CACHE_ENTRIES.set(stats.total_entries as i64);
    }

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Create metrics router exposing `/metrics`
pub fn metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
