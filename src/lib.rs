//! Minting and collection verification for SOBA AI-art NFTs on Solana.
//!
//! The user-facing [`MintPipeline`] builds one atomic transaction per token
//! (mint account, holding account, metadata, master edition) and records the
//! token once it is confirmed. The privileged [`VerificationService`] later
//! verifies its membership in the collection with the collection authority's
//! key and marks the record verified.

pub mod config;
pub mod error;
pub mod image;
pub mod instructions;
pub mod pda;
pub mod pipeline;
pub mod reconciler;
pub mod request;
pub mod retry;
pub mod rpc;
pub mod submitter;
pub mod tier;
pub mod transaction;
pub mod verifier;

#[cfg(test)]
mod testing;

use solana_program::{pubkey, pubkey::Pubkey};

/// Collection every minted token is attached to.
pub const COLLECTION_MINT: Pubkey = pubkey!("JBvMgUVSD9oQiwcfQx932CCbheaRpmiSFoLpESwzGeyn");

/// Update authority of the collection, the only key allowed to verify.
pub const COLLECTION_AUTHORITY: Pubkey = pubkey!("BdvamG8zJbo9t5F7jwhhpusoe4rb6mgrAkScqnMychr2");

/// SOBA token, gates the premium frames.
pub const SOBA_MINT: Pubkey = pubkey!("25p2BoNp6qrJH5As6ek6H7Ei495oSkyZd3tGb97sqFmH");

pub use config::{CollectionConfig, PipelineConfig};
pub use error::{MintError, Result};
pub use pipeline::{MintOutcome, MintPipeline};
pub use reconciler::{JsonFileStore, MemoryStore, MintRecord, MintRecordStore, Reconciler};
pub use request::{build_mint_request, MintRequest, UiState};
pub use submitter::{SubmissionResult, Submitter};
pub use transaction::{KeypairWallet, RequesterWallet};
pub use verifier::{CollectionVerifier, VerificationOutcome, VerificationService};
