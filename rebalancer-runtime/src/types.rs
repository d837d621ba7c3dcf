use alloy::primitives::{Address, Bytes, U256, address};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Desired portfolio configuration, reconciled against the risk service at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSpec {
    pub portfolio_id: String,
    pub org_id: String,
    pub name: String,
    pub chain_id: u64,
    pub max_risk_score: Decimal,
    pub rebalance_frequency_hours: u32,
    /// Resolved against the configured server origin when left empty.
    #[serde(default)]
    pub rebalance_webhook_url: Option<String>,
    pub min_num_positions: u32,
    pub max_num_positions: u32,
    #[serde(rename = "initial_amount_in_usd")]
    pub initial_amount_usd: Decimal,
    /// Always derived from the signing key, never read from configuration.
    #[serde(skip_deserializing)]
    pub wallet_addr: Option<Address>,
    pub main_asset_addr: Address,
}

impl Default for PortfolioSpec {
    fn default() -> Self {
        Self {
            portfolio_id: "main-portfolio".into(),
            org_id: "risk-api-client".into(),
            name: "Main Portfolio".into(),
            chain_id: 42161,
            max_risk_score: Decimal::new(375, 2),
            rebalance_frequency_hours: 1,
            rebalance_webhook_url: None,
            min_num_positions: 3,
            max_num_positions: 3,
            initial_amount_usd: Decimal::new(10, 0),
            wallet_addr: None,
            main_asset_addr: address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
        }
    }
}

impl PortfolioSpec {
    /// Copy of this spec bound to the wallet derived from the signing key.
    pub fn with_wallet(&self, wallet: Address) -> Self {
        Self {
            wallet_addr: Some(wallet),
            ..self.clone()
        }
    }
}

/// The risk service's view of a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemotePortfolio {
    pub id: String,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub max_risk_score: Option<Decimal>,
    #[serde(default)]
    pub rebalance_frequency_hours: Option<u32>,
    #[serde(default)]
    pub rebalance_webhook_url: Option<String>,
    #[serde(default)]
    pub min_num_positions: Option<u32>,
    #[serde(default)]
    pub max_num_positions: Option<u32>,
    #[serde(default, rename = "initialAmountInUSD")]
    pub initial_amount_usd: Option<Decimal>,
    #[serde(default)]
    pub wallet_addr: Option<String>,
    #[serde(default)]
    pub main_asset_addr: Option<String>,
}

impl RemotePortfolio {
    /// Identity match: same portfolio id within the same organization.
    pub fn matches(&self, spec: &PortfolioSpec) -> bool {
        self.id == spec.portfolio_id && self.org_id.as_deref() == Some(spec.org_id.as_str())
    }

    /// Only an explicit `isActive: false` marks a portfolio inactive.
    pub fn counts_as_active(&self) -> bool {
        self.is_active != Some(false)
    }

    pub(crate) fn from_spec(spec: &PortfolioSpec, active: bool) -> Self {
        Self {
            id: spec.portfolio_id.clone(),
            org_id: Some(spec.org_id.clone()),
            is_active: Some(active),
            name: Some(spec.name.clone()),
            chain_id: Some(spec.chain_id),
            max_risk_score: Some(spec.max_risk_score),
            rebalance_frequency_hours: Some(spec.rebalance_frequency_hours),
            rebalance_webhook_url: spec.rebalance_webhook_url.clone(),
            min_num_positions: Some(spec.min_num_positions),
            max_num_positions: Some(spec.max_num_positions),
            initial_amount_usd: Some(spec.initial_amount_usd),
            wallet_addr: spec.wallet_addr.map(|a| a.to_string()),
            main_asset_addr: Some(spec.main_asset_addr.to_string()),
        }
    }
}

/// Payload action kinds delivered by the rebalance webhook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    TokenApproveJoin,
    TokenApproveExit,
    PoolJoin,
    PoolExit,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::TokenApproveJoin => "tokenApproveJoin",
            PayloadKind::TokenApproveExit => "tokenApproveExit",
            PayloadKind::PoolJoin => "poolJoin",
            PayloadKind::PoolExit => "poolExit",
        }
    }

    pub fn is_approval(&self) -> bool {
        matches!(self, PayloadKind::TokenApproveJoin | PayloadKind::TokenApproveExit)
    }

    /// Pool actions are followed by the settlement delay.
    pub fn is_pool_action(&self) -> bool {
        matches!(self, PayloadKind::PoolJoin | PayloadKind::PoolExit)
    }

    /// Execution rank: approvals, then exits, then joins.
    pub fn precedence(&self) -> u8 {
        match self {
            PayloadKind::TokenApproveJoin | PayloadKind::TokenApproveExit => 0,
            PayloadKind::PoolExit => 1,
            PayloadKind::PoolJoin => 2,
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque call descriptor. `data` and `value` are passed through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub chain_id: u64,
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, deserialize_with = "deserialize_value")]
    pub value: U256,
}

/// One rebalance instruction from the risk service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    #[serde(rename = "beefyId")]
    pub pool_id: String,
    #[serde(default)]
    pub status: Option<String>,
    pub payload: Payload,
}

/// An allocation's payload placed at its position in the execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStep {
    /// 1-based position within the batch.
    pub position: usize,
    pub pool_id: String,
    pub label: Option<String>,
    pub payload: Payload,
}

/// Outcome of one execution batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchResult {
    Completed {
        batch_id: Uuid,
        steps: usize,
        finished_at: DateTime<Utc>,
    },
    Halted {
        batch_id: Uuid,
        /// 1-based position of the step that failed.
        position: usize,
        kind: PayloadKind,
        pool_id: String,
        reason: String,
        finished_at: DateTime<Utc>,
    },
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchResult::Completed { .. })
    }

    pub fn batch_id(&self) -> Uuid {
        match self {
            BatchResult::Completed { batch_id, .. } | BatchResult::Halted { batch_id, .. } => {
                *batch_id
            }
        }
    }
}

/// Accepts `value` as a JSON number, a decimal string, or a 0x-prefixed hex
/// string. `null` means zero. Amounts above `u64::MAX` must be sent as strings.
fn deserialize_value<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawValue {
        Number(u64),
        Text(String),
    }

    match Option::<RawValue>::deserialize(deserializer)? {
        None => Ok(U256::ZERO),
        Some(RawValue::Number(n)) => Ok(U256::from(n)),
        Some(RawValue::Text(s)) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(hex) if hex.is_empty() => Ok(U256::ZERO),
                Some(hex) => U256::from_str_radix(hex, 16),
                None if s.is_empty() => Ok(U256::ZERO),
                None => U256::from_str_radix(s, 10),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("invalid value {s:?}: {e}")))
        }
    }
}
