//! Collection membership verification.
//!
//! Runs with the collection authority's keypair, which never leaves this
//! process, and is kept separate from the user-facing mint pipeline. A
//! failed verification leaves the minted token as it is; the record simply
//! stays unverified until a later run succeeds.

use std::sync::Arc;

use mpl_token_metadata::accounts::Metadata;
use solana_program::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use tracing::{debug, info, warn};

use crate::config::CollectionConfig;
use crate::error::{MintError, Result};
use crate::instructions::{verify_collection_instructions, PriorityFee};
use crate::pda::derive_addresses;
use crate::reconciler::{MintRecordStore, Reconciler};
use crate::rpc::MintNetwork;
use crate::submitter::{SubmissionResult, SubmitSettings, Submitter};
use crate::transaction::{AssembledTransaction, SignedTransaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(Signature),
    AlreadyVerified,
    /// The token's metadata account does not exist yet, nothing was sent.
    NotYetMinted,
    Failed(String),
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(
            self,
            VerificationOutcome::Verified(_) | VerificationOutcome::AlreadyVerified
        )
    }

    pub fn error(&self, mint: &Pubkey) -> Option<MintError> {
        match self {
            VerificationOutcome::NotYetMinted => Some(MintError::NotYetMinted(mint.to_string())),
            VerificationOutcome::Failed(reason) => {
                Some(MintError::VerificationFailed(reason.clone()))
            }
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            VerificationOutcome::Verified(signature) => {
                format!("Collection membership verified ({})", signature)
            }
            VerificationOutcome::AlreadyVerified => {
                "Collection membership is already verified".to_string()
            }
            VerificationOutcome::NotYetMinted => {
                "Token not found on-chain yet, verification will be retried".to_string()
            }
            VerificationOutcome::Failed(reason) => format!(
                "Your NFT was created but is not yet verified in the collection: {}",
                reason
            ),
        }
    }
}

pub struct CollectionVerifier<N> {
    network: Arc<N>,
    submitter: Submitter<N>,
    authority: Arc<Keypair>,
    collection: CollectionConfig,
    priority_fee: Option<PriorityFee>,
}

impl<N: MintNetwork> CollectionVerifier<N> {
    pub fn new(
        network: Arc<N>,
        settings: SubmitSettings,
        authority: Arc<Keypair>,
        collection: CollectionConfig,
        priority_fee: Option<PriorityFee>,
    ) -> Result<Self> {
        if authority.pubkey() != collection.authority {
            return Err(MintError::AuthorityMismatch {
                expected: collection.authority.to_string(),
                actual: authority.pubkey().to_string(),
            });
        }
        Ok(Self {
            submitter: Submitter::new(Arc::clone(&network), settings),
            network,
            authority,
            collection,
            priority_fee,
        })
    }

    pub fn collection(&self) -> &CollectionConfig {
        &self.collection
    }

    pub async fn verify(&self, mint: &Pubkey) -> VerificationOutcome {
        let addresses = derive_addresses(mint, &self.collection.mint);
        let retry = self.submitter.settings().retry;
        let network = self.network.as_ref();
        let metadata = &addresses.metadata;

        let account = match retry
            .run("fetch metadata", move |_| network.get_account(metadata))
            .await
        {
            Ok(account) => account,
            Err(err) => return VerificationOutcome::Failed(err.to_string()),
        };
        let account = match account {
            Some(account) if account.owner == mpl_token_metadata::ID => account,
            Some(account) => {
                debug!(
                    "Metadata {} owned by {}, not the metadata program",
                    addresses.metadata, account.owner
                );
                return VerificationOutcome::NotYetMinted;
            }
            None => {
                debug!("Metadata {} for {} not found", addresses.metadata, mint);
                return VerificationOutcome::NotYetMinted;
            }
        };

        match Metadata::from_bytes(&account.data) {
            Ok(metadata) => match metadata.collection {
                Some(collection) if collection.key != self.collection.mint => {
                    return VerificationOutcome::Failed(format!(
                        "token belongs to collection {}",
                        collection.key
                    ));
                }
                Some(collection) if collection.verified => {
                    info!("{} already verified in {}", mint, self.collection.mint);
                    return VerificationOutcome::AlreadyVerified;
                }
                Some(_) => {}
                None => {
                    return VerificationOutcome::Failed(
                        "token has no collection reference".to_string(),
                    );
                }
            },
            // leave the final word to the metadata program
            Err(err) => warn!("Could not decode metadata {}: {}", addresses.metadata, err),
        }

        let freshness = match retry
            .run("fetch blockhash", move |_| network.latest_freshness())
            .await
        {
            Ok(freshness) => freshness,
            Err(err) => return VerificationOutcome::Failed(err.to_string()),
        };

        let authority = self.authority.pubkey();
        let instructions = verify_collection_instructions(
            &addresses,
            &self.collection.mint,
            &authority,
            self.priority_fee,
        );
        let assembled = AssembledTransaction::new(instructions, authority, freshness);
        let signed = match SignedTransaction::sign_with_keypairs(&assembled, &[&*self.authority]) {
            Ok(signed) => signed,
            Err(err) => return VerificationOutcome::Failed(err.to_string()),
        };

        info!("Verifying {} in collection {}", mint, self.collection.mint);
        match self.submitter.submit_and_confirm(&signed).await {
            SubmissionResult::Confirmed(signature) => VerificationOutcome::Verified(signature),
            SubmissionResult::Rejected(reason) => VerificationOutcome::Failed(reason),
            SubmissionResult::Expired => {
                VerificationOutcome::Failed("verification transaction expired".to_string())
            }
            SubmissionResult::TimedOut => {
                VerificationOutcome::Failed("verification not confirmed in time".to_string())
            }
            SubmissionResult::Unreachable(reason) => VerificationOutcome::Failed(reason),
        }
    }
}

/// Totals of one reconciliation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub verified: usize,
    pub not_yet_minted: usize,
    pub failed: usize,
}

/// Privileged side of the application: verification plus the record update.
pub struct VerificationService<N, S> {
    verifier: CollectionVerifier<N>,
    reconciler: Reconciler<S>,
}

impl<N: MintNetwork, S: MintRecordStore> VerificationService<N, S> {
    pub fn new(verifier: CollectionVerifier<N>, reconciler: Reconciler<S>) -> Self {
        Self {
            verifier,
            reconciler,
        }
    }

    pub async fn verify_collection(&self, mint: &Pubkey) -> Result<VerificationOutcome> {
        let outcome = self.verifier.verify(mint).await;
        if outcome.is_verified() {
            match self.reconciler.mark_verified(mint).await {
                Ok(()) => {}
                Err(MintError::RecordNotFound(_)) => {
                    warn!("{} verified on-chain but has no mint record", mint);
                }
                Err(err) => return Err(err),
            }
        } else {
            warn!("{}: {}", mint, outcome.user_message());
        }
        Ok(outcome)
    }

    /// Verify every record still marked unverified.
    pub async fn reconcile_pending(&self) -> Result<ReconcileReport> {
        let pending = self.reconciler.unverified().await?;
        info!("Reconciling {} unverified mints", pending.len());

        let mut report = ReconcileReport::default();
        for record in pending {
            match self.verify_collection(&record.mint_address).await? {
                VerificationOutcome::Verified(_) | VerificationOutcome::AlreadyVerified => {
                    report.verified += 1
                }
                VerificationOutcome::NotYetMinted => report.not_yet_minted += 1,
                VerificationOutcome::Failed(_) => report.failed += 1,
            }
        }
        Ok(report)
    }
}
