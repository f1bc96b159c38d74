use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The payload holds a value with no canonical encoding (e.g. a NaN float).
    #[error("payload cannot be canonically serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("the first block is not a genesis block")]
    MissingGenesis,

    #[error("mining was cancelled")]
    Cancelled,
}

/// Why a chain failed validation. `index` is the position of the offending block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("block {index}: previous_hash does not match the preceding block hash")]
    BrokenLink { index: usize },

    #[error("block {index}: hash has fewer than {difficulty} leading zero digits")]
    InsufficientWork { index: usize, difficulty: usize },
}

impl ValidationError {
    pub fn index(&self) -> usize {
        match self {
            ValidationError::HashMismatch { index }
            | ValidationError::BrokenLink { index }
            | ValidationError::InsufficientWork { index, .. } => *index,
        }
    }
}
