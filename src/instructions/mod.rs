pub mod mint_nft;
pub mod verify_collection;

pub use mint_nft::{mint_nft_instructions, MintAccounts, MINT_ACCOUNT_LEN};
pub use verify_collection::{verify_collection_instructions, PriorityFee};
