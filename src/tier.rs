//! Frames and SOBA balance gating.
//!
//! Each frame requires the requester to hold a minimum amount of SOBA.
//! Requirements are in whole tokens, balances are read in raw units.

use solana_program::{program_pack::Pack, pubkey::Pubkey};
use spl_token::state::Account as TokenAccount;
use tracing::debug;

use crate::error::{MintError, Result};
use crate::pda::holding_address;
use crate::rpc::MintNetwork;

pub const SOBA_DECIMALS: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub id: &'static str,
    pub name: &'static str,
    /// Whole SOBA tokens.
    pub required_balance: u64,
    /// Border style applied to the framed image.
    pub overlay: &'static str,
}

impl Frame {
    pub fn required_raw(&self) -> u64 {
        self.required_balance
            .saturating_mul(10u64.pow(SOBA_DECIMALS as u32))
    }
}

pub static FRAMES: [Frame; 4] = [
    Frame {
        id: "basic",
        name: "Basic Frame",
        required_balance: 0,
        overlay: "border-[#ff6b00]",
    },
    Frame {
        id: "modern",
        name: "Modern Frame",
        required_balance: 200_000,
        overlay: "border-blue-500",
    },
    Frame {
        id: "elegant",
        name: "Elegant Frame",
        required_balance: 300_000,
        overlay: "border-purple-500",
    },
    Frame {
        id: "minimal",
        name: "Minimal Frame",
        required_balance: 400_000,
        overlay: "border-green-500",
    },
];

pub fn frame(id: &str) -> Result<&'static Frame> {
    FRAMES
        .iter()
        .find(|frame| frame.id == id)
        .ok_or_else(|| MintError::UnknownFrame(id.to_string()))
}

/// `raw_balance` is in base units (6 decimals).
pub fn ensure_eligible(frame: &Frame, raw_balance: u64) -> Result<()> {
    let required = frame.required_raw();
    if raw_balance < required {
        return Err(MintError::InsufficientBalance {
            required: frame.required_balance,
            available: raw_balance / 10u64.pow(SOBA_DECIMALS as u32),
        });
    }
    Ok(())
}

/// Raw SOBA balance of `owner`. No holding account means zero.
pub async fn gate_token_balance<N: MintNetwork>(
    network: &N,
    owner: &Pubkey,
    gate_mint: &Pubkey,
) -> Result<u64> {
    let address = holding_address(owner, gate_mint);
    let Some(account) = network.get_account(&address).await? else {
        debug!("No gate token account {} for {}", address, owner);
        return Ok(0);
    };
    if account.owner != spl_token::id() {
        return Ok(0);
    }
    let state = TokenAccount::unpack(&account.data)?;
    if state.mint != *gate_mint || state.owner != *owner {
        return Ok(0);
    }
    Ok(state.amount)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::FakeNetwork;
    use crate::SOBA_MINT;

    #[test]
    fn test_frame_table() {
        assert_eq!(frame("basic").unwrap().required_balance, 0);
        assert_eq!(frame("minimal").unwrap().required_balance, 400_000);
        assert_eq!(
            frame("gold"),
            Err(MintError::UnknownFrame("gold".to_string()))
        );
    }

    #[test]
    fn test_eligibility() {
        let modern = frame("modern").unwrap();
        let one = 1_000_000;
        assert!(ensure_eligible(modern, 200_000 * one).is_ok());
        assert_eq!(
            ensure_eligible(modern, 150_000 * one),
            Err(MintError::InsufficientBalance {
                required: 200_000,
                available: 150_000
            })
        );
        assert!(ensure_eligible(frame("basic").unwrap(), 0).is_ok());
    }

    #[tokio::test]
    async fn test_balance_lookup() {
        let network = FakeNetwork::new(10);
        let owner = Pubkey::new_unique();
        assert_eq!(gate_token_balance(&network, &owner, &SOBA_MINT).await, Ok(0));

        network.set_token_balance(&owner, &SOBA_MINT, 42_000_000);
        assert_eq!(
            gate_token_balance(&network, &owner, &SOBA_MINT).await,
            Ok(42_000_000)
        );

        // a balance in a different mint does not count
        let other = Pubkey::new_unique();
        assert_eq!(gate_token_balance(&network, &owner, &other).await, Ok(0));
    }
}
