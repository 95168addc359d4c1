//! API route handlers
//!
//! - `health`: liveness, readiness and Prometheus metrics
//! - `vectorize`: the batch vectorization endpoint

pub mod health;
pub mod vectorize;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Versioned path the vectorize endpoint is always served on.
pub const VECTORIZE_PATH: &str = "/api/v1/vectorize";

/// API version and base info
///
/// Returns server information including version, the active provider and
/// available endpoints. Requires no authentication.
///
/// # Response
///
/// ```json
/// {
///   "name": "vecgate",
///   "version": "0.1.0",
///   "api_version": "v1",
///   "provider": "vision",
///   "dimensions": 1024,
///   "endpoints": ["..."]
/// }
/// ```
pub async fn api_info(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let mut endpoints = vec![state.config.route.clone()];
    if state.config.route != VECTORIZE_PATH {
        endpoints.push(VECTORIZE_PATH.to_string());
    }
    endpoints.extend(["/health", "/ready", "/metrics"].map(String::from));

    Ok(Json(json!({
        "name": "vecgate",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "provider": state.gateway.provider_name(),
        "dimensions": state.gateway.config().dimensions,
        "max_batch_size": state.gateway.config().max_batch_size,
        "endpoints": endpoints,
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
