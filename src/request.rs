// Mint requests and the metadata embedded into every minted token

use solana_program::pubkey::Pubkey;

use crate::error::{MintError, Result};
use crate::pda::parse_identifier;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_URI_LENGTH: usize = 200;
pub const MAX_CREATOR_LIMIT: usize = 5;
pub const MAX_BASIS_POINTS: u16 = 10_000;

pub const DEFAULT_NAME: &str = "AI Generated NFT";
pub const DEFAULT_SYMBOL: &str = "AINFT";
/// 5% royalty
pub const DEFAULT_SELLER_FEE_BASIS_POINTS: u16 = 500;

/// What the UI has collected by the time the user presses "mint".
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub wallet: Option<String>,
    pub generated_image: Option<String>,
    pub selected_frame: Option<String>,
    pub image_record_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub requester: Pubkey,
    pub image_url: String,
    pub frame_id: String,
    pub image_record_id: Option<String>,
}

pub fn build_mint_request(state: &UiState) -> Result<MintRequest> {
    let wallet = state
        .wallet
        .as_deref()
        .ok_or(MintError::MissingField("wallet"))?;
    let requester = parse_identifier(wallet)?;

    let image_url = state
        .generated_image
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(MintError::MissingField("generated_image"))?;

    let frame_id = state
        .selected_frame
        .as_deref()
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
        .ok_or(MintError::MissingField("selected_frame"))?;

    Ok(MintRequest {
        requester,
        image_url: image_url.to_string(),
        frame_id: frame_id.to_string(),
        image_record_id: state.image_record_id.clone(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatorShare {
    pub address: Pubkey,
    pub verified: bool,
    pub share: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub creators: Vec<CreatorShare>,
}

impl NftMetadata {
    /// Default metadata for a request. The requester is the sole creator and
    /// signs the create instruction, so the creator entry can be verified.
    pub fn for_request(request: &MintRequest, uri: String) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            uri,
            seller_fee_basis_points: DEFAULT_SELLER_FEE_BASIS_POINTS,
            creators: vec![CreatorShare {
                address: request.requester,
                verified: true,
                share: 100,
            }],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(MintError::InvalidMetadata(format!(
                "name must be 1..={} bytes, got {}",
                MAX_NAME_LENGTH,
                self.name.len()
            )));
        }
        if self.symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(MintError::InvalidMetadata(format!(
                "symbol must be at most {} bytes, got {}",
                MAX_SYMBOL_LENGTH,
                self.symbol.len()
            )));
        }
        if self.uri.is_empty() || self.uri.len() > MAX_URI_LENGTH {
            return Err(MintError::InvalidMetadata(format!(
                "uri must be 1..={} bytes, got {}",
                MAX_URI_LENGTH,
                self.uri.len()
            )));
        }
        if self.seller_fee_basis_points > MAX_BASIS_POINTS {
            return Err(MintError::InvalidMetadata(format!(
                "seller fee {} exceeds {} basis points",
                self.seller_fee_basis_points, MAX_BASIS_POINTS
            )));
        }
        if self.creators.len() > MAX_CREATOR_LIMIT {
            return Err(MintError::InvalidMetadata(format!(
                "at most {} creators allowed",
                MAX_CREATOR_LIMIT
            )));
        }
        if !self.creators.is_empty() {
            let total: u32 = self.creators.iter().map(|c| u32::from(c.share)).sum();
            if total != 100 {
                return Err(MintError::InvalidMetadata(format!(
                    "creator shares must sum to 100, got {}",
                    total
                )));
            }
        }
        Ok(())
    }
}
