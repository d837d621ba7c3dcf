use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::RebalancerApiState;

pub const HEALTH_PATH: &str = "/is-healthy";

pub fn router() -> Router<Arc<RebalancerApiState>> {
    Router::new().route(HEALTH_PATH, get(is_healthy))
}

async fn is_healthy(State(state): State<Arc<RebalancerApiState>>) -> (StatusCode, Json<Value>) {
    if state.reconciler.is_healthy(&state.portfolio).await {
        (StatusCode::OK, Json(json!({ "status": true })))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": false })))
    }
}
