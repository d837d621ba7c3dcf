use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::RebalancerApiState;
use crate::error::ApiError;
use crate::routes::health::HEALTH_PATH;

pub async fn auth_middleware(
    State(state): State<Arc<RebalancerApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Liveness probes carry no credentials
    if request.uri().path() == HEALTH_PATH {
        return Ok(next.run(request).await);
    }

    let authorized = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.api_token);

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "rejected request with invalid credentials");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}
