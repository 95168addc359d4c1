use crate::error::ServerError;
use crate::state::ServerState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id assigned by [`request_id`], available as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-api-key")
        .or_else(|| headers.get("api-key"))
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.strip_prefix("Bearer ").unwrap_or(s))
        })
        .map(str::trim)
}

/// API Key authentication middleware
///
/// Accepts `X-API-Key`, `api-key` or `Authorization: Bearer <key>`. With no
/// keys configured every caller shares one rate limit bucket.
pub async fn api_key_auth(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let slot = if state.config.auth_enabled() {
        let key = presented_key(request.headers()).ok_or_else(|| {
            ServerError::Authentication(
                "API key required. Provide it in 'X-API-Key' or 'Authorization: Bearer <key>' header"
                    .to_string(),
            )
        })?;
        let slot = state
            .match_api_key(key)
            .ok_or_else(|| ServerError::Authentication("Invalid API key".to_string()))?;
        Some(slot)
    } else {
        None
    };

    if !state.check_rate_limit(slot) {
        metrics::counter!("vecgate_http_rate_limited_total").increment(1);
        return Err(ServerError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Request ID injection middleware
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Logging middleware
///
/// Logs the path only; query strings may carry credentials.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = std::time::Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    tracing::debug!(
        method = %method,
        path = %path,
        request_id = %request_id,
        "Request started"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    metrics::histogram!("vecgate_http_request_duration_seconds", "status" => status.as_u16().to_string())
        .record(duration.as_secs_f64());

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        request_id = %request_id,
        "Request completed"
    );

    response
}
