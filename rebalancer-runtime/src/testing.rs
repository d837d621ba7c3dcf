//! In-memory [`ChainAdapter`] for tests: canned chain state, real local
//! signing, and a log of every call in order.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::chain::{ChainAdapter, FeeData, parse_signer, sign_eip1559};
use crate::error::RebalancerError;

/// Hardhat account #0.
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    Nonce,
    EstimateGas { to: Address, data: Bytes },
    FeeData,
    Sign { nonce: u64, data: Bytes },
}

pub struct ScriptedChain {
    signer: PrivateKeySigner,
    next_nonce: AtomicU64,
    fail_estimate_for: Option<Bytes>,
    panic_on_nonce: bool,
    calls: Mutex<Vec<ChainCall>>,
}

impl Default for ScriptedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self {
            signer: parse_signer(TEST_PRIVATE_KEY).expect("valid test key"),
            next_nonce: AtomicU64::new(0),
            fail_estimate_for: None,
            panic_on_nonce: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make gas estimation fail for transactions carrying `data`.
    pub fn failing_estimate_for(mut self, data: Bytes) -> Self {
        self.fail_estimate_for = Some(data);
        self
    }

    /// Panic inside `pending_nonce`, simulating a crashed batch.
    pub fn panicking_on_nonce(mut self) -> Self {
        self.panic_on_nonce = true;
        self
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Call data of every signed transaction, in signing order.
    pub fn signed_data(&self) -> Vec<Bytes> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChainCall::Sign { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChainCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl ChainAdapter for ScriptedChain {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn pending_nonce(&self) -> Result<u64, RebalancerError> {
        self.record(ChainCall::Nonce);
        if self.panic_on_nonce {
            panic!("nonce lookup crashed");
        }
        Ok(self.next_nonce.load(Ordering::SeqCst))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, RebalancerError> {
        let data = request.input.input().cloned().unwrap_or_default();
        let to = request.to.and_then(|kind| kind.to().copied()).unwrap_or_default();
        self.record(ChainCall::EstimateGas {
            to,
            data: data.clone(),
        });
        if self.fail_estimate_for.as_ref() == Some(&data) {
            return Err(RebalancerError::Chain("execution reverted".into()));
        }
        Ok(90_000)
    }

    async fn fee_data(&self) -> Result<FeeData, RebalancerError> {
        self.record(ChainCall::FeeData);
        Ok(FeeData {
            max_fee_per_gas: 20_000_000,
            max_priority_fee_per_gas: 1_000_000,
        })
    }

    fn sign(&self, tx: TxEip1559) -> Result<Bytes, RebalancerError> {
        self.record(ChainCall::Sign {
            nonce: tx.nonce,
            data: tx.input.clone(),
        });
        // A broadcast transaction moves the pending nonce forward.
        self.next_nonce.fetch_add(1, Ordering::SeqCst);
        sign_eip1559(&self.signer, tx)
    }
}
