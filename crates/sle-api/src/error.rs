use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use sle_core::error::SleError;
use sle_core::types::SeatId;

/// RFC 7807 Problem Details envelope (spec §6/§7). `type` is one of the
/// `urn:ticketing:inventory:{kind}` URIs the spec names; kind-specific
/// fields (e.g. `conflictSeatIds`) are merged into the JSON object directly.
#[derive(Debug, Serialize)]
struct ProblemDetailsBase {
    #[serde(rename = "type")]
    type_uri: String,
    title: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Wraps a `SleError` so it can be returned directly from an axum handler.
pub struct ApiError(pub SleError);

impl From<SleError> for ApiError {
    fn from(e: SleError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after_secs: Option<u64> = None;
        let (status, type_suffix, title, extra) = match &self.0 {
            SleError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "validation",
                "request validation failed",
                json!({ "detail": msg }),
            ),
            SleError::Conflict { conflict_seat_ids } => (
                StatusCode::CONFLICT,
                "conflict",
                "one or more seats are unavailable",
                json!({ "conflictSeatIds": seat_strs(conflict_seat_ids) }),
            ),
            SleError::Stale { seats } => (
                StatusCode::CONFLICT,
                "expired",
                "fencing token stale or expired",
                json!({ "staleSeatIds": seat_strs(seats) }),
            ),
            SleError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not-found",
                "hold not found",
                json!({ "holdId": id }),
            ),
            SleError::IdempotencyMismatch => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid-idempotency-key",
                "idempotency key reused with a different request body",
                json!({}),
            ),
            SleError::RateLimited { retry_after_ms } => {
                retry_after_secs = Some(retry_after_ms.div_ceil(1_000).max(1));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate-limited",
                    "rate limit exceeded",
                    json!({ "retryAfterMs": retry_after_ms }),
                )
            }
            SleError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "operation timed out",
                json!({}),
            ),
            SleError::StorageError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage-error",
                "storage backend error",
                json!({}),
            ),
            SleError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal invariant violation",
                json!({}),
            ),
        };

        let detail = match &self.0 {
            SleError::Validation(_) => None, // already folded into `extra.detail`
            _ => Some(self.0.to_string()),
        };

        let mut body = serde_json::to_value(ProblemDetailsBase {
            type_uri: format!("urn:ticketing:inventory:{type_suffix}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail,
        })
        .unwrap_or_else(|_| json!({}));

        if let (Value::Object(ref mut map), Value::Object(extra_map)) = (&mut body, extra) {
            map.extend(extra_map);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn seat_strs(seats: &[SeatId]) -> Vec<String> {
    seats.iter().map(|s| s.0.clone()).collect()
}
