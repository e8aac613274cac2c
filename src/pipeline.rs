//! User-facing mint flow.
//!
//! `start_mint` gates on the selected frame, resolves the image reference,
//! then builds, signs and submits the six-instruction mint transaction with
//! a fresh ephemeral mint keypair. Only an attempt whose blockhash has expired
//! is rebuilt, after checking whether it landed after all; one that times out
//! is watched until it expires. The off-chain record is written only once the
//! token is confirmed. Collection verification is not part of this flow, see
//! [`crate::verifier::VerificationService`].

use std::sync::Arc;

use solana_program::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{MintError, Result};
use crate::image::{self, ImageFetcher};
use crate::instructions::{mint_nft_instructions, MintAccounts, MINT_ACCOUNT_LEN};
use crate::pda::{derive_addresses, metadata_address};
use crate::reconciler::{MintRecordStore, Reconciler};
use crate::request::{MintRequest, NftMetadata};
use crate::rpc::MintNetwork;
use crate::submitter::{SubmissionResult, Submitter};
use crate::tier;
use crate::transaction::{AssembledTransaction, RequesterWallet, SignedTransaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    /// The token exists on-chain. `recorded` is false when the off-chain
    /// record could not be written.
    Confirmed {
        mint: Pubkey,
        signature: Signature,
        recorded: bool,
    },
    /// Nothing was created.
    Rejected(String),
    /// Every attempt expired before landing. Nothing was created.
    Expired,
    /// The attempt could not be resolved either way and may still land.
    /// Minting again risks a second token.
    Unconfirmed { mint: Pubkey, signature: Signature },
}

impl MintOutcome {
    pub fn mint(&self) -> Option<Pubkey> {
        match self {
            MintOutcome::Confirmed { mint, .. } => Some(*mint),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            MintOutcome::Confirmed {
                mint,
                recorded: true,
                ..
            } => format!(
                "Your NFT {} was created. Collection verification is pending.",
                mint
            ),
            MintOutcome::Confirmed { mint, .. } => format!(
                "Your NFT {} was created, but it could not be saved to your gallery yet.",
                mint
            ),
            MintOutcome::Rejected(reason) => format!("The NFT was not created: {}", reason),
            MintOutcome::Expired => {
                "The NFT was not created: the transaction expired before confirmation. Please try again."
                    .to_string()
            }
            MintOutcome::Unconfirmed { mint, signature } => format!(
                "Your NFT {} was submitted but is not confirmed yet. Check transaction {} before minting again.",
                mint, signature
            ),
        }
    }
}

pub struct MintPipeline<N, S, F> {
    network: Arc<N>,
    submitter: Submitter<N>,
    reconciler: Reconciler<S>,
    fetcher: F,
    config: PipelineConfig,
}

impl<N, S, F> MintPipeline<N, S, F>
where
    N: MintNetwork,
    S: MintRecordStore,
    F: ImageFetcher,
{
    pub fn new(network: Arc<N>, reconciler: Reconciler<S>, fetcher: F, config: PipelineConfig) -> Self {
        Self {
            submitter: Submitter::new(Arc::clone(&network), config.submit),
            network,
            reconciler,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn start_mint<W: RequesterWallet>(
        &self,
        request: &MintRequest,
        wallet: &W,
    ) -> Result<MintOutcome> {
        if wallet.pubkey() != request.requester {
            return Err(MintError::Signing(format!(
                "wallet {} is not the requester {}",
                wallet.pubkey(),
                request.requester
            )));
        }

        let frame = tier::frame(&request.frame_id)?;
        if frame.required_balance > 0 {
            let gate_mint = self.config.gate_mint;
            let balance =
                tier::gate_token_balance(self.network.as_ref(), &request.requester, &gate_mint)
                    .await?;
            tier::ensure_eligible(frame, balance)?;
        }
        info!("Minting {} with frame {}", request.image_url, frame.id);

        let uri = image::resolve(&self.fetcher, &request.image_url).await?;
        let metadata = NftMetadata::for_request(request, uri.clone());
        metadata.validate()?;

        let retry = self.config.submit.retry;
        let network = self.network.as_ref();
        let rent = retry
            .run("fetch rent", move |_| network.minimum_rent(MINT_ACCOUNT_LEN))
            .await?;

        let mut keypair = Keypair::new();
        let max_attempts = self.config.max_rebuilds + 1;
        let mut attempt = 1;
        loop {
            let mint = keypair.pubkey();
            let signed = self
                .build_and_sign(&mint, &keypair, request, &metadata, rent, wallet)
                .await?;
            debug!("Attempt {}/{} for mint {}", attempt, max_attempts, mint);

            let mut result = self.submitter.submit_and_confirm(&signed).await;
            if result == SubmissionResult::TimedOut {
                info!("Mint {} still pending, watching until its blockhash expires", mint);
                result = self.submitter.watch(&signed).await;
            }
            match &result {
                SubmissionResult::Confirmed(signature) => {
                    return Ok(self.finish(request, &mint, &uri, *signature).await);
                }
                SubmissionResult::Rejected(reason) => {
                    warn!("Mint {} rejected: {}", mint, reason);
                    return Ok(MintOutcome::Rejected(reason.clone()));
                }
                SubmissionResult::Expired
                | SubmissionResult::TimedOut
                | SubmissionResult::Unreachable(_) => {}
            }

            let existence = self.check_landed(&mint).await;
            if existence.metadata == Some(true) {
                info!("Mint {} landed after its attempt ended", mint);
                return Ok(self.finish(request, &mint, &uri, signed.signature()).await);
            }
            match &result {
                SubmissionResult::Unreachable(reason) => {
                    return Err(MintError::TransientNetwork(reason.clone()));
                }
                SubmissionResult::Expired if existence.metadata.is_some() => {}
                _ => {
                    warn!("Cannot tell whether mint {} landed, not rebuilding", mint);
                    return Ok(MintOutcome::Unconfirmed {
                        mint,
                        signature: signed.signature(),
                    });
                }
            }
            if attempt >= max_attempts {
                return Ok(MintOutcome::Expired);
            }

            // an expired attempt can never land, so its mint address is still free
            let reuse = existence.mint == Some(false);
            if !reuse {
                keypair = Keypair::new();
            }
            attempt += 1;
            warn!(
                "Rebuilding expired mint transaction, attempt {}/{}, {} keypair",
                attempt,
                max_attempts,
                if reuse { "same" } else { "fresh" }
            );
        }
    }

    async fn build_and_sign<W: RequesterWallet>(
        &self,
        mint: &Pubkey,
        keypair: &Keypair,
        request: &MintRequest,
        metadata: &NftMetadata,
        rent: u64,
        wallet: &W,
    ) -> Result<SignedTransaction> {
        let collection_mint = self.config.collection.mint;
        let accounts = MintAccounts {
            mint: *mint,
            requester: request.requester,
            collection_mint,
            addresses: derive_addresses(mint, &collection_mint),
        };
        let instructions = mint_nft_instructions(&accounts, metadata, rent)?;

        let network = self.network.as_ref();
        let freshness = self
            .config
            .submit
            .retry
            .run("fetch blockhash", move |_| network.latest_freshness())
            .await?;

        let assembled = AssembledTransaction::new(instructions, request.requester, freshness);
        SignedTransaction::sign(&assembled, keypair, wallet).await
    }

    /// Which of the attempt's accounts exist. `None` when the lookup failed.
    async fn check_landed(&self, mint: &Pubkey) -> Existence {
        let retry = self.config.submit.retry;
        let network = self.network.as_ref();
        let metadata = metadata_address(mint);
        let metadata = &metadata;

        let metadata_exists = retry
            .run("fetch metadata", move |_| network.get_account(metadata))
            .await
            .map(|account| {
                account.is_some_and(|account| account.owner == mpl_token_metadata::ID)
            })
            .ok();
        let mint_exists = retry
            .run("fetch mint", move |_| network.get_account(mint))
            .await
            .map(|account| account.is_some())
            .ok();

        Existence {
            mint: mint_exists,
            metadata: metadata_exists,
        }
    }

    async fn finish(
        &self,
        request: &MintRequest,
        mint: &Pubkey,
        image_reference: &str,
        signature: Signature,
    ) -> MintOutcome {
        info!("Minted {} ({})", mint, signature);
        let recorded = match self
            .reconciler
            .record_mint(mint, image_reference, &request.requester)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!("Minted {} but recording it failed: {}", mint, err);
                false
            }
        };
        if recorded {
            if let Some(image_record_id) = &request.image_record_id {
                if let Err(err) = self.reconciler.link_image(mint, image_record_id).await {
                    warn!("Could not link image {} to {}: {}", image_record_id, mint, err);
                }
            }
        }
        MintOutcome::Confirmed {
            mint: *mint,
            signature,
            recorded,
        }
    }
}

struct Existence {
    mint: Option<bool>,
    metadata: Option<bool>,
}
