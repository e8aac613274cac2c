// Deterministic Token Metadata addresses for a mint and the fixed collection

use std::str::FromStr;

use solana_program::pubkey::Pubkey;

use crate::error::{MintError, Result};

pub const METADATA_SEED: &[u8] = b"metadata";
pub const EDITION_SEED: &[u8] = b"edition";

/// The four Token Metadata accounts a mint attempt touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAddresses {
    pub metadata: Pubkey,
    pub master_edition: Pubkey,
    pub collection_metadata: Pubkey,
    pub collection_master_edition: Pubkey,
}

/// Parse a base58 account identifier.
pub fn parse_identifier(value: &str) -> Result<Pubkey> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MintError::InvalidIdentifier(value.to_string()));
    }
    Pubkey::from_str(trimmed).map_err(|_| MintError::InvalidIdentifier(value.to_string()))
}

pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    let program_id = mpl_token_metadata::ID;
    let (address, _bump) = Pubkey::find_program_address(
        &[METADATA_SEED, program_id.as_ref(), mint.as_ref()],
        &program_id,
    );
    address
}

pub fn master_edition_address(mint: &Pubkey) -> Pubkey {
    let program_id = mpl_token_metadata::ID;
    let (address, _bump) = Pubkey::find_program_address(
        &[
            METADATA_SEED,
            program_id.as_ref(),
            mint.as_ref(),
            EDITION_SEED,
        ],
        &program_id,
    );
    address
}

pub fn derive_addresses(mint: &Pubkey, collection_mint: &Pubkey) -> DerivedAddresses {
    DerivedAddresses {
        metadata: metadata_address(mint),
        master_edition: master_edition_address(mint),
        collection_metadata: metadata_address(collection_mint),
        collection_master_edition: master_edition_address(collection_mint),
    }
}

/// Same as [`derive_addresses`] for identifiers that arrive as strings.
pub fn derive_from_str(mint: &str, collection_mint: &Pubkey) -> Result<DerivedAddresses> {
    let mint = parse_identifier(mint)?;
    Ok(derive_addresses(&mint, collection_mint))
}

/// Holding account that custodies the owner's unit of `mint`.
pub fn holding_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}
