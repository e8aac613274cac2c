//! Assembled and signed transactions.
//!
//! An [`AssembledTransaction`] is immutable once built: its blockhash fixes
//! the validity window, so retries resend the same [`SignedTransaction`]
//! instead of rebuilding it.

use solana_program::{hash::Hash, instruction::Instruction, message::Message, pubkey::Pubkey};
use solana_sdk::{
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use tracing::debug;

use crate::error::{MintError, Result};

/// A recent blockhash and the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessToken {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl FreshnessToken {
    pub fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_block_height
    }
}

/// Instruction kinds the pipeline emits, used to check ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionStep {
    CreateMintAccount,
    InitializeMint,
    CreateHoldingAccount,
    MintOne,
    CreateMetadata,
    CreateMasterEdition,
    VerifyCollection,
    ComputeBudget,
}

// Instruction discriminators, first data byte
const TOKEN_INITIALIZE_MINT: u8 = 0;
const TOKEN_MINT_TO: u8 = 7;
const TOKEN_INITIALIZE_MINT2: u8 = 20;
const METADATA_CREATE_MASTER_EDITION_V3: u8 = 17;
const METADATA_CREATE_METADATA_V3: u8 = 33;
const METADATA_VERIFY: u8 = 52;

impl InstructionStep {
    pub const MINT_SEQUENCE: [InstructionStep; 6] = [
        InstructionStep::CreateMintAccount,
        InstructionStep::InitializeMint,
        InstructionStep::CreateHoldingAccount,
        InstructionStep::MintOne,
        InstructionStep::CreateMetadata,
        InstructionStep::CreateMasterEdition,
    ];

    pub fn classify(ix: &Instruction) -> Option<InstructionStep> {
        let tag = ix.data.first().copied();
        if ix.program_id == solana_program::system_program::ID {
            // system instructions are a little-endian u32 tag, CreateAccount is 0
            return (ix.data.get(..4) == Some(&[0, 0, 0, 0][..]))
                .then_some(InstructionStep::CreateMintAccount);
        }
        if ix.program_id == spl_token::id() {
            return match tag {
                Some(TOKEN_INITIALIZE_MINT) | Some(TOKEN_INITIALIZE_MINT2) => {
                    Some(InstructionStep::InitializeMint)
                }
                Some(TOKEN_MINT_TO) => Some(InstructionStep::MintOne),
                _ => None,
            };
        }
        if ix.program_id == spl_associated_token_account::id() {
            return Some(InstructionStep::CreateHoldingAccount);
        }
        if ix.program_id == mpl_token_metadata::ID {
            return match tag {
                Some(METADATA_CREATE_METADATA_V3) => Some(InstructionStep::CreateMetadata),
                Some(METADATA_CREATE_MASTER_EDITION_V3) => {
                    Some(InstructionStep::CreateMasterEdition)
                }
                Some(METADATA_VERIFY) => Some(InstructionStep::VerifyCollection),
                _ => None,
            };
        }
        if ix.program_id == solana_sdk::compute_budget::id() {
            return Some(InstructionStep::ComputeBudget);
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    instructions: Vec<Instruction>,
    freshness: FreshnessToken,
    transaction: Transaction,
}

impl AssembledTransaction {
    pub fn new(instructions: Vec<Instruction>, fee_payer: Pubkey, freshness: FreshnessToken) -> Self {
        let message =
            Message::new_with_blockhash(&instructions, Some(&fee_payer), &freshness.blockhash);
        Self {
            instructions,
            freshness,
            transaction: Transaction::new_unsigned(message),
        }
    }

    pub fn steps(&self) -> Vec<Option<InstructionStep>> {
        self.instructions.iter().map(InstructionStep::classify).collect()
    }

    /// Signers the message requires, fee payer first.
    pub fn required_signers(&self) -> &[Pubkey] {
        let message = &self.transaction.message;
        let count = message.header.num_required_signatures as usize;
        &message.account_keys[..count]
    }
}

/// The requester's wallet. Signing may wait on the user indefinitely and may
/// be refused, in which case nothing has reached the network.
#[allow(async_fn_in_trait)]
pub trait RequesterWallet {
    fn pubkey(&self) -> Pubkey;

    /// Add the wallet's signature to a transaction that already carries the
    /// ephemeral mint signature.
    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction>;
}

/// A wallet backed by a local keypair (CLI use and tests).
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

impl RequesterWallet for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, mut transaction: Transaction) -> Result<Transaction> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| MintError::Signing(e.to_string()))?;
        Ok(transaction)
    }
}

/// A fully signed transaction together with its wire bytes. Every send of an
/// attempt transmits exactly these bytes.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    transaction: Transaction,
    wire: Vec<u8>,
    freshness: FreshnessToken,
}

impl SignedTransaction {
    /// Sign with the ephemeral mint keypair, then with the requester wallet.
    /// The ephemeral key has no other chance to sign once the transaction is
    /// handed to the wallet.
    pub async fn sign<W: RequesterWallet>(
        assembled: &AssembledTransaction,
        ephemeral: &Keypair,
        wallet: &W,
    ) -> Result<Self> {
        let mut transaction = assembled.transaction.clone();
        transaction
            .try_partial_sign(&[ephemeral], assembled.freshness.blockhash)
            .map_err(|e| MintError::Signing(e.to_string()))?;

        let transaction = wallet.sign_transaction(transaction).await?;
        if transaction.message != assembled.transaction.message {
            return Err(MintError::Signing(
                "wallet returned a different message".to_string(),
            ));
        }
        Self::finish(transaction, assembled.freshness)
    }

    /// Sign with local keypairs only (server-held authority).
    pub fn sign_with_keypairs(assembled: &AssembledTransaction, signers: &[&Keypair]) -> Result<Self> {
        let mut transaction = assembled.transaction.clone();
        transaction
            .try_sign(signers, assembled.freshness.blockhash)
            .map_err(|e| MintError::Signing(e.to_string()))?;
        Self::finish(transaction, assembled.freshness)
    }

    fn finish(transaction: Transaction, freshness: FreshnessToken) -> Result<Self> {
        if !transaction.is_signed() {
            return Err(MintError::Signing("missing required signatures".to_string()));
        }
        transaction
            .verify()
            .map_err(|e| MintError::Signing(e.to_string()))?;
        let wire = bincode::serialize(&transaction)
            .map_err(|e| MintError::Signing(e.to_string()))?;
        debug!(
            "Signed transaction {} ({} bytes)",
            transaction.signatures[0],
            wire.len()
        );
        Ok(Self {
            transaction,
            wire,
            freshness,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn wire_bytes(&self) -> &[u8] {
        &self.wire
    }

    pub fn freshness(&self) -> FreshnessToken {
        self.freshness
    }

    /// The fee payer's signature, which identifies the transaction.
    pub fn signature(&self) -> Signature {
        self.transaction.signatures[0]
    }
}
