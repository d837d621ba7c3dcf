//! Signing and chain-state access for the rebalancer wallet.
//!
//! The execution engine only sees the [`ChainAdapter`] capability; the
//! production implementation talks JSON-RPC through an alloy HTTP provider
//! and signs locally with the configured private key.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, TxSignerSync};
use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::error::RebalancerError;

/// EIP-1559 fee parameters for the next transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Narrow capability the execution engine needs from the chain and the wallet.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Wallet address derived from the signing key.
    fn address(&self) -> Address;

    /// Nonce from the chain's "pending" view. Never cached.
    async fn pending_nonce(&self) -> Result<u64, RebalancerError>;

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, RebalancerError>;

    async fn fee_data(&self) -> Result<FeeData, RebalancerError>;

    /// Sign and return the EIP-2718 encoded raw transaction.
    fn sign(&self, tx: TxEip1559) -> Result<Bytes, RebalancerError>;
}

/// Parse a hex private key (with or without "0x").
pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner, RebalancerError> {
    if private_key.trim().is_empty() {
        return Err(RebalancerError::ConfigError(
            "Missing required environment variable: PRIVATE_KEY".into(),
        ));
    }
    private_key
        .trim()
        .parse()
        .map_err(|e| RebalancerError::ConfigError(format!("Invalid private key: {e}")))
}

/// Wallet address for a hex private key.
pub fn derive_wallet_address(private_key: &str) -> Result<Address, RebalancerError> {
    Ok(parse_signer(private_key)?.address())
}

/// Sign an EIP-1559 transaction with a local key and encode it for broadcast.
pub fn sign_eip1559(signer: &PrivateKeySigner, mut tx: TxEip1559) -> Result<Bytes, RebalancerError> {
    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| RebalancerError::Signing(e.to_string()))?;
    let envelope: TxEnvelope = tx.into_signed(signature).into();
    Ok(Bytes::from(envelope.encoded_2718()))
}

/// JSON-RPC backed adapter with a local signer.
pub struct AlloyChainAdapter {
    provider: RootProvider<Ethereum>,
    signer: PrivateKeySigner,
}

impl AlloyChainAdapter {
    /// Create a new adapter from an RPC URL and hex-encoded private key.
    pub fn new(rpc_url: &str, private_key: &str) -> Result<Self, RebalancerError> {
        let signer = parse_signer(private_key)?;

        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| RebalancerError::ConfigError(format!("Invalid RPC URL: {e}")))?;

        Ok(Self {
            provider: RootProvider::new_http(url),
            signer,
        })
    }
}

#[async_trait]
impl ChainAdapter for AlloyChainAdapter {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn pending_nonce(&self) -> Result<u64, RebalancerError> {
        self.provider
            .get_transaction_count(self.signer.address())
            .pending()
            .await
            .map_err(|e| RebalancerError::Chain(format!("Failed to fetch nonce: {e}")))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, RebalancerError> {
        self.provider
            .estimate_gas(request.clone())
            .await
            .map_err(|e| RebalancerError::Chain(format!("Gas estimation failed: {e}")))
    }

    async fn fee_data(&self) -> Result<FeeData, RebalancerError> {
        let estimate = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| RebalancerError::Chain(format!("Fee estimation failed: {e}")))?;
        Ok(FeeData {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    fn sign(&self, tx: TxEip1559) -> Result<Bytes, RebalancerError> {
        sign_eip1559(&self.signer, tx)
    }
}
