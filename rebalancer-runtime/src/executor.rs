//! Payload execution pipeline. Orders a rebalance batch, then signs,
//! submits, and evaluates each step strictly one after another.
//!
//! Flow per step:
//! 1. Build a transaction request from the payload and the wallet address
//! 2. Read the pending nonce, estimate gas, fetch EIP-1559 fees, sign
//! 3. Submit the raw transaction to the settlement service
//! 4. A thrown error or a falsy envelope fails the step: it is reported via
//!    `mark-tx-as-failed` and the rest of the batch is skipped
//! 5. A successful pool action is followed by the settlement delay

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::TxEip1559;
use alloy::primitives::{Bytes, TxKind};
use alloy::rpc::types::TransactionRequest;
use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::chain::ChainAdapter;
use crate::config::DEFAULT_SETTLEMENT_DELAY;
use crate::error::RebalancerError;
use crate::risk_client::{FailedTxReport, RiskClient};
use crate::types::{Allocation, BatchResult, ExecutionStep, Payload};

/// How a batch is sequenced before execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionOrder {
    /// Approvals first, then pool exits, then pool joins.
    #[default]
    KindPrecedence,
}

impl ExecutionOrder {
    pub fn arrange(self, allocations: Vec<Allocation>) -> Vec<ExecutionStep> {
        match self {
            ExecutionOrder::KindPrecedence => order_by_kind_precedence(allocations),
        }
    }
}

/// Kind-precedence ordering: a stable sort on [`PayloadKind::precedence`]
/// (approvals, then exits, then joins). Allocations of equal rank keep the
/// order the risk service sent them in, so every pool's approval runs before
/// its pool action.
///
/// [`PayloadKind::precedence`]: crate::types::PayloadKind::precedence
pub fn order_by_kind_precedence(allocations: Vec<Allocation>) -> Vec<ExecutionStep> {
    let mut allocations = allocations;
    allocations.sort_by_key(|a| a.payload.kind.precedence());
    allocations
        .into_iter()
        .enumerate()
        .map(|(i, a)| ExecutionStep {
            position: i + 1,
            pool_id: a.pool_id,
            label: a.status,
            payload: a.payload,
        })
        .collect()
}

/// Executes rebalance batches for the configured wallet.
pub struct PayloadExecutor {
    chain: Arc<dyn ChainAdapter>,
    risk_client: RiskClient,
    settlement_delay: Duration,
    order: ExecutionOrder,
}

impl PayloadExecutor {
    pub fn new(chain: Arc<dyn ChainAdapter>, risk_client: RiskClient) -> Self {
        Self {
            chain,
            risk_client,
            settlement_delay: DEFAULT_SETTLEMENT_DELAY,
            order: ExecutionOrder::default(),
        }
    }

    pub fn with_settlement_delay(mut self, delay: Duration) -> Self {
        self.settlement_delay = delay;
        self
    }

    /// Run a batch to completion or to its first failing step.
    ///
    /// Never returns an error: every step failure becomes a
    /// [`BatchResult::Halted`] carrying the failing step's 1-based position.
    pub async fn execute_batch(&self, allocations: Vec<Allocation>) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!("batch", %batch_id, size = allocations.len());
        self.run_batch(batch_id, allocations).instrument(span).await
    }

    async fn run_batch(&self, batch_id: Uuid, allocations: Vec<Allocation>) -> BatchResult {
        let steps = self.order.arrange(allocations);
        let total = steps.len();
        tracing::info!(steps = total, "executing rebalance batch");

        for step in &steps {
            tracing::info!(
                step = step.position,
                kind = %step.payload.kind,
                pool_id = %step.pool_id,
                label = ?step.label,
                "executing step"
            );

            if let Err(e) = self.execute_step(step).await {
                tracing::error!(
                    step = step.position,
                    kind = %step.payload.kind,
                    pool_id = %step.pool_id,
                    error = %e,
                    "step failed, halting batch"
                );
                self.report_failure(&step.payload).await;
                return BatchResult::Halted {
                    batch_id,
                    position: step.position,
                    kind: step.payload.kind,
                    pool_id: step.pool_id.clone(),
                    reason: e.to_string(),
                    finished_at: Utc::now(),
                };
            }

            tracing::info!(
                step = step.position,
                kind = %step.payload.kind,
                pool_id = %step.pool_id,
                "step executed"
            );

            if step.payload.kind.is_pool_action() && !self.settlement_delay.is_zero() {
                tracing::debug!(
                    delay_ms = self.settlement_delay.as_millis() as u64,
                    "waiting for settlement"
                );
                tokio::time::sleep(self.settlement_delay).await;
            }
        }

        tracing::info!(steps = total, "rebalance batch completed");
        BatchResult::Completed {
            batch_id,
            steps: total,
            finished_at: Utc::now(),
        }
    }

    async fn execute_step(&self, step: &ExecutionStep) -> Result<(), RebalancerError> {
        let raw = self.sign_payload(&step.payload).await?;
        let signed_tx = format!("0x{}", hex::encode(&raw));

        let envelope = self
            .risk_client
            .submit_signed_transaction(&signed_tx)
            .await?;
        if !envelope.status {
            return Err(RebalancerError::Rejected(envelope.error_message()));
        }
        tracing::debug!(step = step.position, response = ?envelope.res, "submission accepted");
        Ok(())
    }

    /// Build and sign the transaction for one payload. The nonce is read
    /// fresh from the chain's pending view on every call.
    pub async fn sign_payload(&self, payload: &Payload) -> Result<Bytes, RebalancerError> {
        let from = self.chain.address();

        let mut request = TransactionRequest::default()
            .from(from)
            .to(payload.to)
            .input(payload.data.clone().into())
            .value(payload.value);
        request.chain_id = Some(payload.chain_id);

        let nonce = self.chain.pending_nonce().await?;
        let gas_limit = self.chain.estimate_gas(&request).await?;
        let fees = self.chain.fee_data().await?;

        let tx = TxEip1559 {
            chain_id: payload.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: TxKind::Call(payload.to),
            value: payload.value,
            access_list: Default::default(),
            input: payload.data.clone(),
        };

        self.chain.sign(tx)
    }

    /// Best effort: a failed report is logged and otherwise ignored.
    async fn report_failure(&self, payload: &Payload) {
        let report = FailedTxReport {
            from: self.chain.address(),
            to: payload.to,
            data: payload.data.clone(),
        };
        if let Err(e) = self.risk_client.mark_tx_as_failed(&report).await {
            tracing::warn!(error = %e, to = %payload.to, "failed to mark transaction as failed");
        }
    }
}
