use thiserror::Error;

/// Why a block failed chain validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The chain holds no blocks at all.
    EmptyChain,
    /// The stored index does not match the block's position.
    IndexMismatch,
    /// The genesis block does not point at the sentinel previous hash.
    GenesisPreviousHash,
    /// The stored previous hash differs from the predecessor's hash.
    PreviousHashMismatch,
    /// The stored hash is not the digest of the block's fields.
    HashMismatch,
    /// The digest does not meet the chain's difficulty.
    InsufficientWork,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ValidationFailure::EmptyChain => "chain has no genesis block",
            ValidationFailure::IndexMismatch => "index does not match position",
            ValidationFailure::GenesisPreviousHash => "genesis previous hash is not the sentinel",
            ValidationFailure::PreviousHashMismatch => "previous hash does not match predecessor",
            ValidationFailure::HashMismatch => "stored hash does not match block contents",
            ValidationFailure::InsufficientWork => "hash does not satisfy difficulty",
        };
        f.write_str(msg)
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("block {index} is invalid: {reason}")]
pub struct ValidationError {
    pub index: u64,
    pub reason: ValidationFailure,
}

impl ValidationError {
    pub fn new(index: u64, reason: ValidationFailure) -> Self {
        Self { index, reason }
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("the blockchain is invalid: {0}")]
    ChainInvalid(#[from] ValidationError),

    #[error("invalid difficulty {0}: at most 256 leading zero bits can be required")]
    InvalidDifficulty(u32),

    #[error("mining was cancelled")]
    Cancelled,

    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),
}
