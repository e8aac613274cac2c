//! Network seam of the pipeline.
//!
//! Every component talks to the cluster through [`MintNetwork`] so tests can
//! script the network. The implementation for the nonblocking Solana
//! `RpcClient` collapses client errors into [`NetworkError`], separating
//! failures worth retrying from deterministic rejections.

use solana_client::{
    client_error::ClientError, nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    account::Account,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use thiserror::Error;
use tracing::debug;

use crate::error::MintError;
use crate::transaction::FreshnessToken;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection problems, timeouts, unhealthy nodes, unknown blockhash.
    #[error("transient: {0}")]
    Transient(String),
    /// The cluster will never accept this transaction as built.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The exact transaction has already been processed.
    #[error("already processed")]
    AlreadyProcessed,
}

impl From<NetworkError> for MintError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Transient(reason) => MintError::TransientNetwork(reason),
            NetworkError::Rejected(reason) => MintError::DeterministicRejection(reason),
            NetworkError::AlreadyProcessed => {
                MintError::DeterministicRejection("already processed".to_string())
            }
        }
    }
}

/// Status of a sent transaction as seen by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Not (yet) seen at the configured commitment.
    Pending,
    Confirmed,
    Failed(String),
}

#[allow(async_fn_in_trait)]
pub trait MintNetwork {
    async fn latest_freshness(&self) -> Result<FreshnessToken, NetworkError>;

    async fn block_height(&self) -> Result<u64, NetworkError>;

    async fn minimum_rent(&self, data_len: usize) -> Result<u64, NetworkError>;

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, NetworkError>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, NetworkError>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, NetworkError>;
}

pub fn classify_client_error(err: ClientError) -> NetworkError {
    match err.get_transaction_error() {
        Some(tx_err) => classify_transaction_error(tx_err),
        None => NetworkError::Transient(err.to_string()),
    }
}

pub fn classify_transaction_error(err: TransactionError) -> NetworkError {
    match err {
        TransactionError::AlreadyProcessed => NetworkError::AlreadyProcessed,
        // node lag, the same transaction can still land elsewhere
        TransactionError::BlockhashNotFound | TransactionError::WouldExceedMaxBlockCostLimit => {
            NetworkError::Transient(err.to_string())
        }
        other => NetworkError::Rejected(other.to_string()),
    }
}

impl MintNetwork for RpcClient {
    async fn latest_freshness(&self) -> Result<FreshnessToken, NetworkError> {
        let (blockhash, last_valid_block_height) = self
            .get_latest_blockhash_with_commitment(self.commitment())
            .await
            .map_err(classify_client_error)?;
        debug!(
            "Latest blockhash {} valid until block height {}",
            blockhash, last_valid_block_height
        );
        Ok(FreshnessToken {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        self.get_block_height().await.map_err(classify_client_error)
    }

    async fn minimum_rent(&self, data_len: usize) -> Result<u64, NetworkError> {
        self.get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(classify_client_error)
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, NetworkError> {
        let response = self
            .get_account_with_commitment(address, self.commitment())
            .await
            .map_err(classify_client_error)?;
        Ok(response.value)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, NetworkError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.commitment().commitment),
            // resends are driven by the retry policy, not the node
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.send_transaction_with_config(transaction, config)
            .await
            .map_err(classify_client_error)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, NetworkError> {
        let response = self
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify_client_error)?;
        let state = match response.value.into_iter().next().flatten() {
            None => SignatureState::Pending,
            Some(status) => match status.err.clone() {
                Some(err) => SignatureState::Failed(err.to_string()),
                None if status.satisfies_commitment(self.commitment()) => SignatureState::Confirmed,
                None => SignatureState::Pending,
            },
        };
        Ok(state)
    }
}
