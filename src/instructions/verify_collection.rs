// Collection membership verification, signed by the collection authority

use mpl_token_metadata::instructions::VerifyCollectionV1;
use solana_program::{instruction::Instruction, pubkey::Pubkey, system_program, sysvar};
use solana_sdk::compute_budget::ComputeBudgetInstruction;

use crate::pda::DerivedAddresses;

/// Optional compute budget prefix for congested clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFee {
    pub compute_unit_limit: u32,
    pub micro_lamports_per_unit: u64,
}

pub fn verify_collection_instruction(
    addresses: &DerivedAddresses,
    collection_mint: &Pubkey,
    authority: &Pubkey,
) -> Instruction {
    VerifyCollectionV1 {
        metadata: addresses.metadata,
        authority: *authority,
        delegate_record: None,
        collection_mint: *collection_mint,
        collection_metadata: Some(addresses.collection_metadata),
        collection_master_edition: Some(addresses.collection_master_edition),
        system_program: system_program::ID,
        sysvar_instructions: sysvar::instructions::ID,
    }
    .instruction()
}

/// The verification transaction body: the verify instruction, preceded by
/// compute budget instructions when a priority fee is configured.
pub fn verify_collection_instructions(
    addresses: &DerivedAddresses,
    collection_mint: &Pubkey,
    authority: &Pubkey,
    priority_fee: Option<PriorityFee>,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(3);
    if let Some(fee) = priority_fee {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
            fee.compute_unit_limit,
        ));
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            fee.micro_lamports_per_unit,
        ));
    }
    instructions.push(verify_collection_instruction(
        addresses,
        collection_mint,
        authority,
    ));
    instructions
}
