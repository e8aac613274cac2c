use solana_program::program_error::ProgramError;
use thiserror::Error;

/// Errors produced by the minting pipeline.
///
/// [`MintError::is_retryable`] marks the errors a later attempt can clear.
/// `TransientNetwork` and `NotYetMinted` clear on a plain retry, `Expired`
/// only on a rebuild with a fresh blockhash, and `VerificationFailed` on the
/// next reconcile run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MintError {
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("transaction rejected: {0}")]
    DeterministicRejection(String),

    #[error("transaction expired before confirmation")]
    Expired,

    #[error("metadata account for mint {0} does not exist yet")]
    NotYetMinted(String),

    #[error("collection verification failed: {0}")]
    VerificationFailed(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("failed to build instruction: {0}")]
    InstructionBuild(String),

    #[error("unknown frame `{0}`")]
    UnknownFrame(String),

    #[error("insufficient balance: frame requires {required} tokens, wallet holds {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("failed to fetch image: {0}")]
    ImageFetch(String),

    #[error("signing was cancelled by the requester")]
    SigningCancelled,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("collection authority mismatch: expected {expected}, got {actual}")]
    AuthorityMismatch { expected: String, actual: String },

    #[error("no mint record for {0}")]
    RecordNotFound(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

impl MintError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MintError::TransientNetwork(_)
                | MintError::Expired
                | MintError::NotYetMinted(_)
                | MintError::VerificationFailed(_)
        )
    }
}

impl From<ProgramError> for MintError {
    fn from(err: ProgramError) -> Self {
        MintError::InstructionBuild(err.to_string())
    }
}

impl From<std::io::Error> for MintError {
    fn from(err: std::io::Error) -> Self {
        MintError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for MintError {
    fn from(err: serde_json::Error) -> Self {
        MintError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MintError>;
