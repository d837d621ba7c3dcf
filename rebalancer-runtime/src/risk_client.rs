use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RebalancerError;
use crate::types::{PortfolioSpec, RemotePortfolio};

/// Response envelope used by every risk service endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: bool,
    pub res: Option<T>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl<T> ApiEnvelope<T> {
    /// Human-readable error detail, if the service sent one.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "no error detail".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PortfolioList {
    #[serde(default)]
    portfolios: Vec<RemotePortfolio>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePortfolioQuery<'a> {
    portfolio_id: &'a str,
    org_id: &'a str,
    name: &'a str,
    chain_id: u64,
    max_risk_score: Decimal,
    rebalance_frequency_hours: u32,
    rebalance_webhook_url: &'a str,
    min_num_positions: u32,
    max_num_positions: u32,
    #[serde(rename = "initialAmountInUSD")]
    initial_amount_usd: Decimal,
    wallet_addr: String,
    main_asset_addr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateQuery<'a> {
    portfolio_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitSignedTxRequest<'a> {
    signed_tx: &'a str,
}

/// Body of a `mark-tx-as-failed` report.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedTxReport {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// Client for the risk service's portfolio endpoints.
#[derive(Debug, Clone)]
pub struct RiskClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RiskClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn read_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, RebalancerError> {
        let status = resp.status();
        let body = resp.bytes().await?;
        match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => Err(RebalancerError::HttpError(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&body)
            ))),
        }
    }

    /// `GET /portfolio/my-portfolios`
    pub async fn list_portfolios(&self) -> Result<Vec<RemotePortfolio>, RebalancerError> {
        let resp = self
            .client
            .get(self.url("/portfolio/my-portfolios"))
            .header("authorization", self.authorization())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RebalancerError::reconciliation("list", e.to_string()))?;

        let envelope: ApiEnvelope<PortfolioList> = Self::read_envelope(resp)
            .await
            .map_err(|e| RebalancerError::reconciliation("list", e.to_string()))?;
        if !envelope.status {
            return Err(RebalancerError::reconciliation(
                "list",
                envelope.error_message(),
            ));
        }
        Ok(envelope.res.unwrap_or_default().portfolios)
    }

    /// `POST /portfolio/create?<portfolio fields>`. The spec must already carry
    /// its derived wallet address and resolved webhook URL.
    pub async fn create_portfolio(
        &self,
        spec: &PortfolioSpec,
    ) -> Result<Option<serde_json::Value>, RebalancerError> {
        let wallet = spec.wallet_addr.ok_or_else(|| {
            RebalancerError::ConfigError("wallet address must be derived before create".into())
        })?;
        let webhook_url = spec.rebalance_webhook_url.as_deref().ok_or_else(|| {
            RebalancerError::ConfigError("webhook URL must be resolved before create".into())
        })?;

        let query = CreatePortfolioQuery {
            portfolio_id: &spec.portfolio_id,
            org_id: &spec.org_id,
            name: &spec.name,
            chain_id: spec.chain_id,
            max_risk_score: spec.max_risk_score,
            rebalance_frequency_hours: spec.rebalance_frequency_hours,
            rebalance_webhook_url: webhook_url,
            min_num_positions: spec.min_num_positions,
            max_num_positions: spec.max_num_positions,
            initial_amount_usd: spec.initial_amount_usd,
            wallet_addr: wallet.to_string(),
            main_asset_addr: spec.main_asset_addr.to_string(),
        };

        let resp = self
            .client
            .post(self.url("/portfolio/create"))
            .query(&query)
            .header("authorization", self.authorization())
            .json(&serde_json::json!({}))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RebalancerError::reconciliation("create", e.to_string()))?;

        let envelope: ApiEnvelope<serde_json::Value> = Self::read_envelope(resp)
            .await
            .map_err(|e| RebalancerError::reconciliation("create", e.to_string()))?;
        if !envelope.status {
            return Err(RebalancerError::reconciliation(
                "create",
                envelope.error_message(),
            ));
        }
        Ok(envelope.res)
    }

    /// `POST /portfolio/activate?portfolioId=…`. Safe to repeat.
    pub async fn activate_portfolio(
        &self,
        portfolio_id: &str,
    ) -> Result<Option<serde_json::Value>, RebalancerError> {
        let resp = self
            .client
            .post(self.url("/portfolio/activate"))
            .query(&ActivateQuery { portfolio_id })
            .header("authorization", self.authorization())
            .json(&serde_json::json!({}))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RebalancerError::reconciliation("activate", e.to_string()))?;

        let envelope: ApiEnvelope<serde_json::Value> = Self::read_envelope(resp)
            .await
            .map_err(|e| RebalancerError::reconciliation("activate", e.to_string()))?;
        if !envelope.status {
            return Err(RebalancerError::reconciliation(
                "activate",
                envelope.error_message(),
            ));
        }
        Ok(envelope.res)
    }

    /// `POST /portfolio/submit-signed-transaction`. Returns the raw envelope;
    /// the caller decides what a falsy `status` means.
    pub async fn submit_signed_transaction(
        &self,
        signed_tx: &str,
    ) -> Result<ApiEnvelope<serde_json::Value>, RebalancerError> {
        let resp = self
            .client
            .post(self.url("/portfolio/submit-signed-transaction"))
            .header("authorization", self.authorization())
            .json(&SubmitSignedTxRequest { signed_tx })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RebalancerError::Submission(e.to_string()))?;

        Self::read_envelope(resp)
            .await
            .map_err(|e| RebalancerError::Submission(e.to_string()))
    }

    /// `POST /portfolio/mark-tx-as-failed`
    pub async fn mark_tx_as_failed(&self, report: &FailedTxReport) -> Result<(), RebalancerError> {
        let resp = self
            .client
            .post(self.url("/portfolio/mark-tx-as-failed"))
            .header("authorization", self.authorization())
            .json(report)
            .timeout(self.timeout)
            .send()
            .await?;

        let envelope: ApiEnvelope<serde_json::Value> = Self::read_envelope(resp).await?;
        if !envelope.status {
            return Err(RebalancerError::HttpError(format!(
                "mark-tx-as-failed rejected: {}",
                envelope.error_message()
            )));
        }
        Ok(())
    }
}
