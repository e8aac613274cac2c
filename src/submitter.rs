//! Sending and confirming signed transactions.
//!
//! `Built -> Signed -> Submitted -> {Confirmed | Expired | Rejected}`, where a
//! built transaction is an [`AssembledTransaction`](crate::transaction::AssembledTransaction)
//! and everything after signing is a [`SubmissionState`]. Sending is retried with the shared [`RetryPolicy`] on transient failures, always
//! with the same signed bytes. Confirmation polling stops at the first of:
//! inclusion, an execution error, the blockhash's last valid block height
//! being passed, or the wall-clock timeout.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::rpc::{MintNetwork, NetworkError, SignatureState};
use crate::transaction::SignedTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Signed,
    Submitted,
    Confirmed,
    Expired,
    Rejected,
}

/// Final result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Confirmed(Signature),
    /// The cluster reported an error that resending cannot change.
    Rejected(String),
    /// The blockhash expired without the transaction landing. It never will.
    Expired,
    /// The wall-clock budget ran out before either inclusion or expiry.
    TimedOut,
    /// Sending kept failing transiently until the retry budget was spent.
    Unreachable(String),
}

impl SubmissionResult {
    pub fn state(&self) -> SubmissionState {
        match self {
            SubmissionResult::Confirmed(_) => SubmissionState::Confirmed,
            SubmissionResult::Rejected(_) => SubmissionState::Rejected,
            SubmissionResult::Expired => SubmissionState::Expired,
            // not known to have been received by a leader
            SubmissionResult::TimedOut => SubmissionState::Submitted,
            SubmissionResult::Unreachable(_) => SubmissionState::Signed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSettings {
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(2),
            confirm_timeout: Duration::from_secs(60),
        }
    }
}

pub struct Submitter<N> {
    network: Arc<N>,
    settings: SubmitSettings,
}

impl<N> Clone for Submitter<N> {
    fn clone(&self) -> Self {
        Self {
            network: Arc::clone(&self.network),
            settings: self.settings,
        }
    }
}

impl<N: MintNetwork> Submitter<N> {
    pub fn new(network: Arc<N>, settings: SubmitSettings) -> Self {
        Self { network, settings }
    }

    pub fn settings(&self) -> &SubmitSettings {
        &self.settings
    }

    pub async fn submit_and_confirm(&self, signed: &SignedTransaction) -> SubmissionResult {
        let expected = signed.signature();
        let network = self.network.as_ref();
        let transaction = signed.transaction();

        let sent = self
            .settings
            .retry
            .run("send transaction", move |attempt| {
                debug!("Sending {} (attempt {})", expected, attempt);
                network.send_transaction(transaction)
            })
            .await;

        match sent {
            Ok(signature) => {
                if signature != expected {
                    warn!("Node returned signature {}, expected {}", signature, expected);
                }
                info!("Submitted {}", expected);
            }
            Err(NetworkError::AlreadyProcessed) => {
                info!("{} was already processed, waiting for confirmation", expected);
            }
            Err(NetworkError::Rejected(reason)) => {
                warn!("{} rejected: {}", expected, reason);
                return SubmissionResult::Rejected(reason);
            }
            Err(NetworkError::Transient(reason)) => {
                warn!("Giving up sending {}: {}", expected, reason);
                return SubmissionResult::Unreachable(reason);
            }
        }

        self.watch(signed).await
    }

    /// Poll a submitted transaction for up to `confirm_timeout`. Calling it
    /// again after `TimedOut` keeps watching while the blockhash may still be
    /// valid.
    pub async fn watch(&self, signed: &SignedTransaction) -> SubmissionResult {
        let expected = signed.signature();
        match tokio::time::timeout(self.settings.confirm_timeout, self.poll(signed)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} not confirmed within {:?}",
                    expected, self.settings.confirm_timeout
                );
                SubmissionResult::TimedOut
            }
        }
    }

    async fn poll(&self, signed: &SignedTransaction) -> SubmissionResult {
        let signature = signed.signature();
        let freshness = signed.freshness();
        loop {
            match self.network.signature_status(&signature).await {
                Ok(SignatureState::Confirmed) => {
                    info!("{} confirmed", signature);
                    return SubmissionResult::Confirmed(signature);
                }
                Ok(SignatureState::Failed(reason)) => {
                    warn!("{} failed on-chain: {}", signature, reason);
                    return SubmissionResult::Rejected(reason);
                }
                Ok(SignatureState::Pending) => {}
                Err(err) => debug!("Status check for {} failed: {}", signature, err),
            }

            match self.network.block_height().await {
                Ok(height) if freshness.is_expired_at(height) => {
                    // one last look, the status may have landed at the boundary
                    match self.network.signature_status(&signature).await {
                        Ok(SignatureState::Confirmed) => {
                            return SubmissionResult::Confirmed(signature);
                        }
                        Ok(SignatureState::Failed(reason)) => {
                            warn!("{} failed on-chain: {}", signature, reason);
                            return SubmissionResult::Rejected(reason);
                        }
                        _ => {}
                    }
                    warn!(
                        "{} expired: block height {} > {}",
                        signature, height, freshness.last_valid_block_height
                    );
                    return SubmissionResult::Expired;
                }
                Ok(_) => {}
                Err(err) => debug!("Block height check failed: {}", err),
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
