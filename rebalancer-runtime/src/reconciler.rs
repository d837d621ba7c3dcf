//! Portfolio reconciliation: make sure exactly one active remote portfolio
//! matches the locally configured spec.
//!
//! Matching is identity based (portfolio id + organization id). A matched
//! portfolio is never diffed or updated field by field; activation is always
//! re-issued because the risk service treats it as idempotent.

use alloy::primitives::Address;

use crate::chain::derive_wallet_address;
use crate::config::resolve_webhook_url;
use crate::error::RebalancerError;
use crate::risk_client::RiskClient;
use crate::types::{PortfolioSpec, RemotePortfolio};

pub struct PortfolioReconciler {
    client: RiskClient,
    private_key: String,
    server_origin: String,
}

impl PortfolioReconciler {
    pub fn new(
        client: RiskClient,
        private_key: impl Into<String>,
        server_origin: impl Into<String>,
    ) -> Self {
        Self {
            client,
            private_key: private_key.into(),
            server_origin: server_origin.into(),
        }
    }

    pub fn client(&self) -> &RiskClient {
        &self.client
    }

    fn wallet(&self) -> Result<Address, RebalancerError> {
        derive_wallet_address(&self.private_key)
    }

    /// Bind the desired spec to the derived wallet and the resolved callback URL.
    fn resolve(&self, desired: &PortfolioSpec) -> Result<PortfolioSpec, RebalancerError> {
        let mut spec = desired.with_wallet(self.wallet()?);
        if spec.rebalance_webhook_url.is_none() {
            spec.rebalance_webhook_url = Some(resolve_webhook_url(&self.server_origin)?);
        }
        Ok(spec)
    }

    /// Create the portfolio if it is missing, then activate it.
    ///
    /// Errors from list, create, or activate are returned as-is; the caller
    /// owns the retry policy.
    pub async fn reconcile(
        &self,
        desired: &PortfolioSpec,
    ) -> Result<RemotePortfolio, RebalancerError> {
        let spec = self.resolve(desired)?;
        tracing::info!(
            portfolio_id = %spec.portfolio_id,
            wallet = ?spec.wallet_addr,
            "wallet address derived from private key"
        );

        let existing = self.client.list_portfolios().await?;
        let mut portfolio = match existing.into_iter().find(|p| p.matches(&spec)) {
            Some(found) => {
                tracing::info!(
                    portfolio_id = %found.id,
                    active = ?found.is_active,
                    "portfolio already exists"
                );
                found
            }
            None => {
                tracing::info!(portfolio_id = %spec.portfolio_id, "creating portfolio");
                let created = self.client.create_portfolio(&spec).await?;
                tracing::info!(
                    portfolio_id = %spec.portfolio_id,
                    response = ?created,
                    "portfolio created"
                );
                RemotePortfolio::from_spec(&spec, false)
            }
        };

        let activation = self.client.activate_portfolio(&spec.portfolio_id).await?;
        tracing::info!(
            portfolio_id = %spec.portfolio_id,
            response = ?activation,
            "portfolio activated"
        );
        portfolio.is_active = Some(true);
        Ok(portfolio)
    }

    /// Liveness check: `true` only when a matching portfolio exists and is
    /// not explicitly inactive. Never returns an error.
    pub async fn is_healthy(&self, desired: &PortfolioSpec) -> bool {
        let spec = match self.wallet() {
            Ok(wallet) => desired.with_wallet(wallet),
            Err(e) => {
                tracing::warn!(error = %e, "health check: signing key unavailable");
                return false;
            }
        };

        match self.client.list_portfolios().await {
            Ok(portfolios) => portfolios
                .iter()
                .find(|p| p.matches(&spec))
                .is_some_and(RemotePortfolio::counts_as_active),
            Err(e) => {
                tracing::warn!(error = %e, "health check: portfolio lookup failed");
                false
            }
        }
    }
}
