// NFT with metadata, master edition and an unverified reference to the fixed collection

use mpl_token_metadata::{
    instructions::{
        CreateMasterEditionV3, CreateMasterEditionV3InstructionArgs, CreateMetadataAccountV3,
        CreateMetadataAccountV3InstructionArgs,
    },
    types::{Collection, Creator, DataV2},
};
use solana_program::{
    instruction::Instruction, program_pack::Pack, pubkey::Pubkey, system_instruction,
    system_program,
};
use spl_token::{instruction as token_instruction, state::Mint};
use tracing::debug;

use crate::error::Result;
use crate::pda::{holding_address, DerivedAddresses};
use crate::request::NftMetadata;

/// Account size the mint is funded for.
pub const MINT_ACCOUNT_LEN: usize = Mint::LEN;

/// Everything the six mint instructions reference.
#[derive(Debug, Clone, Copy)]
pub struct MintAccounts {
    pub mint: Pubkey,
    pub requester: Pubkey,
    pub collection_mint: Pubkey,
    pub addresses: DerivedAddresses,
}

impl MintAccounts {
    pub fn holding_account(&self) -> Pubkey {
        holding_address(&self.requester, &self.mint)
    }
}

/// Builds the instruction list for one NFT, in the order the programs require
/// it: each step reads accounts created by the previous one.
pub fn mint_nft_instructions(
    accounts: &MintAccounts,
    metadata: &NftMetadata,
    rent_lamports: u64,
) -> Result<Vec<Instruction>> {
    metadata.validate()?;

    let requester = &accounts.requester;
    let mint = &accounts.mint;
    let holding_account = accounts.holding_account();

    debug!(
        "Assembling mint {} for {} (holding account {})",
        mint, requester, holding_account
    );

    // Create the mint account at the rent-exempt minimum
    let create_account_ix = system_instruction::create_account(
        requester,
        mint,
        rent_lamports,
        MINT_ACCOUNT_LEN as u64,
        &spl_token::id(),
    );

    // Mint with 0 decimals, requester holds both authorities
    let init_mint_ix =
        token_instruction::initialize_mint2(&spl_token::id(), mint, requester, Some(requester), 0)?;

    // No-op on-chain when the holding account already exists
    let create_holding_ix =
        spl_associated_token_account::instruction::create_associated_token_account_idempotent(
            requester,
            requester,
            mint,
            &spl_token::id(),
        );

    let mint_to_ix = token_instruction::mint_to(
        &spl_token::id(),
        mint,
        &holding_account,
        requester,
        &[],
        1,
    )?;

    let data = DataV2 {
        name: metadata.name.clone(),
        symbol: metadata.symbol.clone(),
        uri: metadata.uri.clone(),
        seller_fee_basis_points: metadata.seller_fee_basis_points,
        creators: if metadata.creators.is_empty() {
            None
        } else {
            Some(
                metadata
                    .creators
                    .iter()
                    .map(|creator| Creator {
                        address: creator.address,
                        verified: creator.verified,
                        share: creator.share,
                    })
                    .collect(),
            )
        },
        // Verified later by the collection authority
        collection: Some(Collection {
            verified: false,
            key: accounts.collection_mint,
        }),
        uses: None,
    };

    let create_metadata_ix = CreateMetadataAccountV3 {
        metadata: accounts.addresses.metadata,
        mint: *mint,
        mint_authority: *requester,
        payer: *requester,
        update_authority: (*requester, true),
        system_program: system_program::ID,
        rent: None,
    }
    .instruction(CreateMetadataAccountV3InstructionArgs {
        data,
        is_mutable: true,
        collection_details: None,
    });

    // max_supply 0: no prints can ever be made from this edition
    let create_master_edition_ix = CreateMasterEditionV3 {
        edition: accounts.addresses.master_edition,
        mint: *mint,
        update_authority: *requester,
        mint_authority: *requester,
        payer: *requester,
        metadata: accounts.addresses.metadata,
        token_program: spl_token::id(),
        system_program: system_program::ID,
        rent: None,
    }
    .instruction(CreateMasterEditionV3InstructionArgs {
        max_supply: Some(0),
    });

    Ok(vec![
        create_account_ix,
        init_mint_ix,
        create_holding_ix,
        mint_to_ix,
        create_metadata_ix,
        create_master_edition_ix,
    ])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pda::derive_addresses;
    use crate::request::{MintRequest, MAX_URI_LENGTH};
    use crate::transaction::{AssembledTransaction, FreshnessToken, InstructionStep};
    use solana_program::hash::Hash;
    use crate::COLLECTION_MINT;

    fn accounts() -> MintAccounts {
        let mint = Pubkey::new_unique();
        MintAccounts {
            mint,
            requester: Pubkey::new_unique(),
            collection_mint: COLLECTION_MINT,
            addresses: derive_addresses(&mint, &COLLECTION_MINT),
        }
    }

    fn metadata(requester: Pubkey) -> NftMetadata {
        let request = MintRequest {
            requester,
            image_url: "https://images.example/1.png".to_string(),
            frame_id: "basic".to_string(),
            image_record_id: None,
        };
        NftMetadata::for_request(&request, request.image_url.clone())
    }

    #[test]
    fn test_six_steps_in_order() {
        let accounts = accounts();
        let ixs = mint_nft_instructions(&accounts, &metadata(accounts.requester), 1_461_600)
            .unwrap();

        let assembled = AssembledTransaction::new(
            ixs,
            accounts.requester,
            FreshnessToken {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 150,
            },
        );
        assert_eq!(
            assembled.steps(),
            InstructionStep::MINT_SEQUENCE.map(Some).to_vec()
        );
        assert_eq!(assembled.required_signers(), &[accounts.requester, accounts.mint]);
    }

    #[test]
    fn test_program_ids() {
        let accounts = accounts();
        let ixs = mint_nft_instructions(&accounts, &metadata(accounts.requester), 1).unwrap();
        assert_eq!(ixs[0].program_id, system_program::ID);
        assert_eq!(ixs[1].program_id, spl_token::id());
        assert_eq!(ixs[2].program_id, spl_associated_token_account::id());
        assert_eq!(ixs[3].program_id, spl_token::id());
        assert_eq!(ixs[4].program_id, mpl_token_metadata::ID);
        assert_eq!(ixs[5].program_id, mpl_token_metadata::ID);
    }

    #[test]
    fn test_accounts_wired_between_steps() {
        let accounts = accounts();
        let ixs = mint_nft_instructions(&accounts, &metadata(accounts.requester), 1).unwrap();
        let holding = accounts.holding_account();

        // create_account: payer, new account
        assert_eq!(ixs[0].accounts[0].pubkey, accounts.requester);
        assert_eq!(ixs[0].accounts[1].pubkey, accounts.mint);
        assert!(ixs[0].accounts[1].is_signer);

        // mint_to targets the holding account created in step 3
        assert_eq!(ixs[2].accounts[1].pubkey, holding);
        assert_eq!(ixs[3].accounts[1].pubkey, holding);

        // metadata and edition use the derived addresses
        assert_eq!(ixs[4].accounts[0].pubkey, accounts.addresses.metadata);
        assert_eq!(ixs[5].accounts[0].pubkey, accounts.addresses.master_edition);
        assert!(ixs[5]
            .accounts
            .iter()
            .any(|meta| meta.pubkey == accounts.addresses.metadata));
    }

    #[test]
    fn test_rejects_invalid_metadata() {
        let accounts = accounts();
        let mut bad = metadata(accounts.requester);
        bad.uri = "x".repeat(MAX_URI_LENGTH + 1);
        assert!(mint_nft_instructions(&accounts, &bad, 1).is_err());
    }
}
