// Scripted cluster used by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use solana_program::{hash::Hash, program_pack::Pack, pubkey::Pubkey, system_instruction};
use solana_sdk::{
    account::Account,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};

use crate::rpc::{MintNetwork, NetworkError, SignatureState};
use crate::transaction::{AssembledTransaction, FreshnessToken, InstructionStep, SignedTransaction};
use crate::COLLECTION_MINT;

pub const RENT_LAMPORTS: u64 = 1_461_600;
const BLOCKHASH_VALIDITY: u64 = 150;

/// What happens to a transaction once it has been accepted by `send`.
#[derive(Debug, Clone)]
pub enum Fate {
    /// Lands after this many status polls.
    Confirm(u32),
    /// Never lands.
    Drop,
    /// Lands with an execution error, reported from this status poll on.
    Fail(String, u32),
    /// Lands, but the status lookup never reports it.
    Silent,
}

struct Tracked {
    fate: Fate,
    polls: u32,
    transaction: Transaction,
    applied: bool,
}

struct MetadataRecord {
    mint: Pubkey,
    update_authority: Pubkey,
    collection_verified: bool,
}

struct State {
    height: u64,
    height_step: u64,
    transient_send_failures: u32,
    reject_reason: Option<String>,
    already_processed: bool,
    default_fate: Fate,
    fates: VecDeque<Fate>,
    sent: Vec<Vec<u8>>,
    tracked: HashMap<Signature, Tracked>,
    accounts: HashMap<Pubkey, Account>,
    metadata: HashMap<Pubkey, MetadataRecord>,
    freshness_calls: u32,
    status_failures: u32,
    account_failures: u32,
}

pub struct FakeNetwork {
    state: Mutex<State>,
}

impl FakeNetwork {
    pub fn new(height: u64) -> Self {
        Self {
            state: Mutex::new(State {
                height,
                height_step: 1,
                transient_send_failures: 0,
                reject_reason: None,
                already_processed: false,
                default_fate: Fate::Drop,
                fates: VecDeque::new(),
                sent: Vec::new(),
                tracked: HashMap::new(),
                accounts: HashMap::new(),
                metadata: HashMap::new(),
                freshness_calls: 0,
                status_failures: 0,
                account_failures: 0,
            }),
        }
    }

    pub fn confirm_after_polls(&self, polls: u32) {
        self.state.lock().unwrap().default_fate = Fate::Confirm(polls);
    }

    pub fn fail_on_chain(&self, reason: &str) {
        self.fail_on_chain_after(reason, 1);
    }

    pub fn fail_on_chain_after(&self, reason: &str, polls: u32) {
        self.state.lock().unwrap().default_fate = Fate::Fail(reason.to_string(), polls);
    }

    /// The next `count` accepted transactions never land.
    pub fn drop_next(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.fates.push_back(Fate::Drop);
        }
    }

    /// The next `count` accepted transactions land without a visible status.
    pub fn land_silently_next(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.fates.push_back(Fate::Silent);
        }
    }

    pub fn fail_sends_transiently(&self, count: u32) {
        self.state.lock().unwrap().transient_send_failures = count;
    }

    pub fn fail_status_checks(&self, count: u32) {
        self.state.lock().unwrap().status_failures = count;
    }

    pub fn fail_account_lookups(&self, count: u32) {
        self.state.lock().unwrap().account_failures = count;
    }

    pub fn reject_sends(&self, reason: &str) {
        self.state.lock().unwrap().reject_reason = Some(reason.to_string());
    }

    pub fn report_already_processed(&self) {
        self.state.lock().unwrap().already_processed = true;
    }

    pub fn advance_height_per_poll(&self, step: u64) {
        self.state.lock().unwrap().height_step = step;
    }

    pub fn block_height_now(&self) -> u64 {
        self.state.lock().unwrap().height
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.sent()
            .iter()
            .map(|bytes| bincode::deserialize(bytes).unwrap())
            .collect()
    }

    pub fn freshness_calls(&self) -> u32 {
        self.state.lock().unwrap().freshness_calls
    }

    pub fn insert_account(&self, address: Pubkey, account: Account) {
        self.state.lock().unwrap().accounts.insert(address, account);
    }

    pub fn has_account(&self, address: &Pubkey) -> bool {
        self.state.lock().unwrap().accounts.contains_key(address)
    }

    /// Create a metadata account as if a mint had landed earlier.
    pub fn insert_metadata(&self, metadata: Pubkey, mint: Pubkey, collection_verified: bool) {
        let mut state = self.state.lock().unwrap();
        state.metadata.insert(
            metadata,
            MetadataRecord {
                mint,
                update_authority: Pubkey::new_unique(),
                collection_verified,
            },
        );
        refresh_metadata_account(&mut state, &metadata);
    }

    pub fn collection_verified(&self, metadata: &Pubkey) -> bool {
        self.state
            .lock()
            .unwrap()
            .metadata
            .get(metadata)
            .map(|record| record.collection_verified)
            .unwrap_or(false)
    }

    /// Credit `owner` with `amount` raw units of `mint` in its holding account.
    pub fn set_token_balance(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) {
        let account = spl_token::state::Account {
            mint: *mint,
            owner: *owner,
            amount,
            state: spl_token::state::AccountState::Initialized,
            ..Default::default()
        };
        let mut data = vec![0u8; spl_token::state::Account::LEN];
        spl_token::state::Account::pack(account, &mut data).unwrap();
        let address = spl_associated_token_account::get_associated_token_address(owner, mint);
        self.insert_account(
            address,
            Account {
                lamports: 2_039_280,
                data,
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
    }
}

impl MintNetwork for FakeNetwork {
    async fn latest_freshness(&self) -> Result<FreshnessToken, NetworkError> {
        let mut state = self.state.lock().unwrap();
        state.freshness_calls += 1;
        Ok(FreshnessToken {
            blockhash: Hash::new_unique(),
            last_valid_block_height: state.height + BLOCKHASH_VALIDITY,
        })
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        let mut state = self.state.lock().unwrap();
        state.height += state.height_step;
        Ok(state.height)
    }

    async fn minimum_rent(&self, _data_len: usize) -> Result<u64, NetworkError> {
        Ok(RENT_LAMPORTS)
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, NetworkError> {
        let mut state = self.state.lock().unwrap();
        if state.account_failures > 0 {
            state.account_failures -= 1;
            return Err(NetworkError::Transient("account lookup timed out".to_string()));
        }
        Ok(state.accounts.get(address).cloned())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, NetworkError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(bincode::serialize(transaction).unwrap());

        if state.transient_send_failures > 0 {
            state.transient_send_failures -= 1;
            return Err(NetworkError::Transient("connection reset by peer".to_string()));
        }
        if let Some(reason) = state.reject_reason.clone() {
            return Err(NetworkError::Rejected(reason));
        }

        let signature = transaction.signatures[0];
        if !state.tracked.contains_key(&signature) {
            let fate = state
                .fates
                .pop_front()
                .unwrap_or_else(|| state.default_fate.clone());
            state.tracked.insert(
                signature,
                Tracked {
                    fate,
                    polls: 0,
                    transaction: transaction.clone(),
                    applied: false,
                },
            );
        }
        if state.already_processed {
            return Err(NetworkError::AlreadyProcessed);
        }
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, NetworkError> {
        let mut state = self.state.lock().unwrap();
        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(NetworkError::Transient("status timeout".to_string()));
        }
        let Some(tracked) = state.tracked.get_mut(signature) else {
            return Ok(SignatureState::Pending);
        };
        tracked.polls += 1;
        match tracked.fate.clone() {
            Fate::Drop => Ok(SignatureState::Pending),
            Fate::Fail(reason, after) if tracked.polls >= after => {
                Ok(SignatureState::Failed(reason))
            }
            Fate::Fail(..) => Ok(SignatureState::Pending),
            Fate::Silent => {
                if !tracked.applied {
                    tracked.applied = true;
                    let transaction = tracked.transaction.clone();
                    apply(&mut state, &transaction);
                }
                Ok(SignatureState::Pending)
            }
            Fate::Confirm(after) if tracked.polls >= after => {
                if !tracked.applied {
                    tracked.applied = true;
                    let transaction = tracked.transaction.clone();
                    apply(&mut state, &transaction);
                }
                Ok(SignatureState::Confirmed)
            }
            Fate::Confirm(_) => Ok(SignatureState::Pending),
        }
    }
}

// Execute the parts of a landed transaction the pipeline later observes
fn apply(state: &mut State, transaction: &Transaction) {
    let message = &transaction.message;
    for compiled in &message.instructions {
        let program_id = message.account_keys[compiled.program_id_index as usize];
        let keys: Vec<Pubkey> = compiled
            .accounts
            .iter()
            .map(|index| message.account_keys[*index as usize])
            .collect();
        let ix = solana_program::instruction::Instruction {
            program_id,
            accounts: keys
                .iter()
                .map(|key| solana_program::instruction::AccountMeta::new_readonly(*key, false))
                .collect(),
            data: compiled.data.clone(),
        };

        match InstructionStep::classify(&ix) {
            Some(InstructionStep::CreateMintAccount) => {
                state.accounts.insert(
                    keys[1],
                    Account {
                        lamports: RENT_LAMPORTS,
                        data: vec![0; spl_token::state::Mint::LEN],
                        owner: spl_token::id(),
                        executable: false,
                        rent_epoch: 0,
                    },
                );
            }
            Some(InstructionStep::CreateMetadata) => {
                let metadata = keys[0];
                state.metadata.insert(
                    metadata,
                    MetadataRecord {
                        mint: keys[1],
                        update_authority: keys[4],
                        collection_verified: false,
                    },
                );
                refresh_metadata_account(state, &metadata);
            }
            Some(InstructionStep::VerifyCollection) => {
                let targets: Vec<Pubkey> = keys
                    .iter()
                    .filter(|key| state.metadata.contains_key(*key))
                    .copied()
                    .collect();
                for metadata in targets {
                    if let Some(record) = state.metadata.get_mut(&metadata) {
                        record.collection_verified = true;
                    }
                    refresh_metadata_account(state, &metadata);
                }
            }
            _ => {}
        }
    }
}

fn refresh_metadata_account(state: &mut State, metadata: &Pubkey) {
    let Some(record) = state.metadata.get(metadata) else {
        return;
    };
    let data = encode_metadata(
        &record.update_authority,
        &record.mint,
        &COLLECTION_MINT,
        record.collection_verified,
    );
    state.accounts.insert(
        *metadata,
        Account {
            lamports: 5_616_720,
            data,
            owner: mpl_token_metadata::ID,
            executable: false,
            rent_epoch: 0,
        },
    );
}

/// Borsh layout of a `MetadataV1` account with one collection reference.
pub fn encode_metadata(
    update_authority: &Pubkey,
    mint: &Pubkey,
    collection: &Pubkey,
    collection_verified: bool,
) -> Vec<u8> {
    fn string(out: &mut Vec<u8>, value: &str) {
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }

    let mut out = vec![4u8]; // Key::MetadataV1
    out.extend_from_slice(update_authority.as_ref());
    out.extend_from_slice(mint.as_ref());
    string(&mut out, "AI Generated NFT");
    string(&mut out, "AINFT");
    string(&mut out, "https://images.example/nft.png");
    out.extend_from_slice(&500u16.to_le_bytes());
    out.push(0); // creators: None
    out.push(0); // primary_sale_happened
    out.push(1); // is_mutable
    out.push(0); // edition_nonce: None
    out.push(0); // token_standard: None
    out.push(1); // collection: Some
    out.push(collection_verified as u8);
    out.extend_from_slice(collection.as_ref());
    out.push(0); // uses: None
    out.push(0); // collection_details: None
    out.push(0); // programmable_config: None
    out
}

/// A signed one-instruction transfer valid until `last_valid_block_height`.
pub fn signed_transfer(last_valid_block_height: u64) -> SignedTransaction {
    let payer = Keypair::new();
    let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
    let assembled = AssembledTransaction::new(
        vec![ix],
        payer.pubkey(),
        FreshnessToken {
            blockhash: Hash::new_unique(),
            last_valid_block_height,
        },
    );
    SignedTransaction::sign_with_keypairs(&assembled, &[&payer]).unwrap()
}
