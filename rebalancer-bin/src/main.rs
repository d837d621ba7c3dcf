//! Rebalancer service.
//!
//! Reconciles the configured portfolio with the risk service (retrying with
//! backoff), then serves the webhook front-end until the process is stopped.

use std::sync::Arc;

use rebalancer_http_api::{RebalancerApiState, build_router};
use rebalancer_runtime::chain::AlloyChainAdapter;
use rebalancer_runtime::retry::retry_with_backoff;
use rebalancer_runtime::{
    PayloadExecutor, PortfolioReconciler, RebalancerConfig, RebalancerError, RiskClient,
};

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}

#[tokio::main]
async fn main() -> Result<(), RebalancerError> {
    dotenvy::dotenv().ok();
    setup_log();

    // ── 1. Configuration (missing secrets are fatal) ─────────────────────
    let config = RebalancerConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
    })?;

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let risk_client = RiskClient::new(&config.risk_api_url, &config.risk_api_key);
    let chain = AlloyChainAdapter::new(&config.rpc_url, &config.private_key)?;
    let reconciler = PortfolioReconciler::new(
        risk_client.clone(),
        &config.private_key,
        &config.server_origin,
    );

    // ── 3. Bootstrap: reconcile the portfolio with backoff ───────────────
    let portfolio = retry_with_backoff(config.bootstrap_retry, |attempt| {
        tracing::info!(attempt, portfolio_id = %config.portfolio.portfolio_id, "reconciling portfolio");
        reconciler.reconcile(&config.portfolio)
    })
    .await
    .inspect_err(|e| {
        tracing::error!(error = %e, "portfolio bootstrap failed after all retries");
    })?;
    tracing::info!(
        portfolio_id = %portfolio.id,
        active = ?portfolio.is_active,
        "portfolio ready"
    );

    // ── 4. Webhook front-end ─────────────────────────────────────────────
    let executor = PayloadExecutor::new(Arc::new(chain), risk_client)
        .with_settlement_delay(config.settlement_delay);
    let state = Arc::new(RebalancerApiState::new(
        reconciler,
        config.portfolio.clone(),
        executor,
        &config.risk_api_key,
    ));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| RebalancerError::ConfigError(format!("Bind to port {} failed: {e}", config.port)))?;
    tracing::info!(
        port = config.port,
        webhook_url = ?config.webhook_url().ok(),
        "rebalancer listening"
    );

    axum::serve(listener, router)
        .await
        .map_err(|e| RebalancerError::HttpError(format!("Server error: {e}")))
}
