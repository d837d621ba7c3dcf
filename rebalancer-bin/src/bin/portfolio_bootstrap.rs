//! One-shot portfolio reconciliation.
//!
//! Runs the same check/create/activate sequence as the service bootstrap,
//! prints the resulting portfolio as JSON and exits.

use rebalancer_runtime::retry::retry_with_backoff;
use rebalancer_runtime::{PortfolioReconciler, RebalancerConfig, RebalancerError, RiskClient};

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}

#[tokio::main]
async fn main() -> Result<(), RebalancerError> {
    dotenvy::dotenv().ok();
    setup_log();

    let config = RebalancerConfig::from_env()?;
    let reconciler = PortfolioReconciler::new(
        RiskClient::new(&config.risk_api_url, &config.risk_api_key),
        &config.private_key,
        &config.server_origin,
    );

    let portfolio = retry_with_backoff(config.bootstrap_retry, |_| {
        reconciler.reconcile(&config.portfolio)
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&portfolio)?);
    Ok(())
}
