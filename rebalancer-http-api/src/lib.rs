pub mod auth;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use rebalancer_runtime::{PayloadExecutor, PortfolioReconciler, PortfolioSpec};

pub use error::ApiError;

pub struct RebalancerApiState {
    pub reconciler: PortfolioReconciler,
    pub portfolio: PortfolioSpec,
    pub executor: Arc<PayloadExecutor>,
    /// Shared secret expected as `Authorization: Bearer <token>`.
    pub api_token: String,
    /// Held for the whole lifetime of an executing batch.
    pub batch_lock: Arc<Mutex<()>>,
}

impl RebalancerApiState {
    pub fn new(
        reconciler: PortfolioReconciler,
        portfolio: PortfolioSpec,
        executor: PayloadExecutor,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            reconciler,
            portfolio,
            executor: Arc::new(executor),
            api_token: api_token.into(),
            batch_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn build_router(state: Arc<RebalancerApiState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::webhook::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
