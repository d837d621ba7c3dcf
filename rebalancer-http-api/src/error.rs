use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Rejections produced before or around batch execution. A halted batch is
/// not an `ApiError`; it is rendered by the webhook route itself.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Busy,
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Busy => (
                StatusCode::TOO_MANY_REQUESTS,
                "A rebalance batch is already executing, retry later".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": false, "error": msg })),
                )
                    .into_response();
            }
        };
        (status, Json(json!({ "error": error }))).into_response()
    }
}
