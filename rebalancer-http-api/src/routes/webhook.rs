use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use rebalancer_runtime::config::WEBHOOK_PATH;
use rebalancer_runtime::{Allocation, BatchResult, PayloadKind};

use crate::RebalancerApiState;
use crate::error::ApiError;

pub const REBALANCE_EVENT: &str = "rebalance";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub allocations: Vec<Allocation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchCompleted {
    status: bool,
    batch_id: Uuid,
    steps: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchHalted {
    status: bool,
    batch_id: Uuid,
    error: String,
    failed_step: FailedStep,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedStep {
    position: usize,
    kind: PayloadKind,
    pool_id: String,
}

pub fn router() -> Router<Arc<RebalancerApiState>> {
    Router::new().route(WEBHOOK_PATH, post(webhook_target))
}

async fn webhook_target(
    State(state): State<Arc<RebalancerApiState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let guard = state.batch_lock.clone().try_lock_owned().map_err(|_| {
        tracing::warn!("rebalance event rejected: batch already executing");
        ApiError::Busy
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook body: {e}")))?;
    if event.event != REBALANCE_EVENT {
        return Err(ApiError::BadRequest(format!(
            "Unsupported event type: {}",
            event.event
        )));
    }

    tracing::info!(allocations = event.allocations.len(), "rebalance event received");

    // The guard travels with the batch so a dropped connection cannot release it early.
    let executor = state.executor.clone();
    let result = tokio::spawn(async move {
        let _guard = guard;
        executor.execute_batch(event.allocations).await
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "rebalance batch aborted");
        ApiError::Internal(format!("Batch execution aborted: {e}"))
    })?;

    Ok(render(result))
}

fn render(result: BatchResult) -> Response {
    match result {
        BatchResult::Completed {
            batch_id, steps, ..
        } => (
            StatusCode::OK,
            Json(BatchCompleted {
                status: true,
                batch_id,
                steps,
            }),
        )
            .into_response(),
        BatchResult::Halted {
            batch_id,
            position,
            kind,
            pool_id,
            reason,
            ..
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(BatchHalted {
                status: false,
                batch_id,
                error: reason,
                failed_step: FailedStep {
                    position,
                    kind,
                    pool_id,
                },
            }),
        )
            .into_response(),
    }
}
