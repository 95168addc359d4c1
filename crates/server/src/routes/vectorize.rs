use crate::error::{ServerError, ServerResult};
use crate::middleware::RequestId;
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::Json;
use gateway::{SkillRequest, SkillResponse};
use std::sync::Arc;

/// Vectorize a batch of records.
///
/// Request and response follow the custom-skill contract:
///
/// ```json
/// { "values": [ { "recordId": 0, "data": { "imageUrl": "https://...", "sasToken": "?sv=..." } } ] }
/// ```
///
/// Per-record failures come back in-line under `errors`; only call-level
/// failures (malformed body, batch limits, timeout, provider down) produce a
/// non-200 status.
pub async fn vectorize(
    State(state): State<Arc<ServerState>>,
    request_id: Option<Extension<RequestId>>,
    body: Result<Json<SkillRequest>, JsonRejection>,
) -> ServerResult<Json<SkillResponse>> {
    // Rejection text can quote the offending input, which may hold a token.
    let Json(request) = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(state.config.max_body_size_mb)
        } else {
            tracing::debug!(status = rejection.status().as_u16(), "rejected request body");
            ServerError::BadRequest("request body is not a valid vectorize batch".to_string())
        }
    })?;

    let request_id = request_id.map(|Extension(id)| id.0).unwrap_or_default();
    let size = request.values.len();
    let response = state.gateway.embed_skill(request).await?;

    let failed = response
        .values
        .iter()
        .filter(|record| !record.errors.is_empty())
        .count();
    tracing::info!(request_id = %request_id, size, failed, "vectorize batch completed");

    Ok(Json(response))
}
