pub mod constants;
pub mod error;
pub mod mine;
pub mod payload;

use constants::GENESIS_HASH;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{Chain, ChainConfig, ValidationMode};
pub use error::{ChainError, ValidationError};
pub use payload::{Payload, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub payload: Payload,
    pub previous_hash: String,
    /// Milliseconds since the Unix epoch, fixed when the block is built.
    pub timestamp: u64,
    pub proof_counter: u64,
    /// Empty until the block is mined.
    pub hash: String,
}

impl Block {
    pub fn new(previous_hash: impl Into<String>, payload: Payload) -> Self {
        Self {
            payload,
            previous_hash: previous_hash.into(),
            timestamp: now_millis(),
            proof_counter: 0,
            hash: String::new(),
        }
    }

    /// The genesis block carries the `"0"` sentinel instead of a digest and is never mined.
    pub fn genesis() -> Self {
        Self {
            hash: GENESIS_HASH.to_string(),
            ..Self::new(GENESIS_HASH, Payload::new())
        }
    }

    /// Everything that goes into the hash except the proof counter.
    pub fn hash_prefix(&self) -> Result<String, ChainError> {
        let payload = self.payload.to_canonical_json()?;
        Ok(format!("{}{}{}", self.previous_hash, payload, self.timestamp))
    }

    /// SHA-256 of `previous_hash`, payload JSON, timestamp and proof counter,
    /// concatenated without separators.
    ///
    /// Because nothing separates the timestamp digits from the counter digits,
    /// the two fields can be edited together without changing the hash input:
    /// timestamp `...000` with counter `655` hashes like timestamp `...0006` with
    /// counter `55`. Validation cannot tell such blocks apart.
    pub fn compute_hash(&self) -> Result<String, ChainError> {
        Ok(pow::hash_with_counter(&self.hash_prefix()?, self.proof_counter))
    }

    /// Search proof counters, starting from the current one, until the hash has at
    /// least `difficulty` leading zero digits.
    ///
    /// There is no iteration cap: an infeasible difficulty never returns. Use
    /// [`mine::mine_parallel`] when the search has to be interruptible.
    pub fn mine(&mut self, difficulty: usize) -> Result<(), ChainError> {
        let prefix = self.hash_prefix()?;
        loop {
            let hash = pow::hash_with_counter(&prefix, self.proof_counter);
            if pow::meets_difficulty(&hash, difficulty) {
                self.hash = hash;
                return Ok(());
            }
            self.proof_counter = self.proof_counter.wrapping_add(1);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub mod pow {
    use sha2::{Digest, Sha256};

    /// SHA-256 over `prefix` followed by the decimal counter, as lowercase hex.
    pub fn hash_with_counter(prefix: &str, counter: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(counter.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn leading_zero_digits(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        leading_zero_digits(hash) >= difficulty
    }
}

pub mod chain {
    use super::*;
    use crate::constants::DEFAULT_DIFFICULTY;
    use std::sync::atomic::AtomicBool;
    use tracing::{debug, info, warn};

    /// How much `validate` checks beyond hash recomputation and linkage.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ValidationMode {
        /// Recomputed hash and previous-hash link only.
        #[default]
        Linkage,
        /// Additionally require every non-genesis hash to meet the chain difficulty.
        StrictProofOfWork,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ChainConfig {
        pub difficulty: usize,
        pub validation: ValidationMode,
    }

    impl Default for ChainConfig {
        fn default() -> Self {
            Self {
                difficulty: DEFAULT_DIFFICULTY,
                validation: ValidationMode::default(),
            }
        }
    }

    impl ChainConfig {
        pub fn new(difficulty: usize) -> Self {
            Self {
                difficulty,
                ..Self::default()
            }
        }

        pub fn strict(mut self) -> Self {
            self.validation = ValidationMode::StrictProofOfWork;
            self
        }
    }

    /// Append-only sequence of blocks anchored by a genesis block.
    ///
    /// Appends take `&mut self`, so at most one append is ever in flight.
    #[derive(Clone, Debug, Serialize)]
    pub struct Chain {
        pub(crate) difficulty: usize,
        pub(crate) validation: ValidationMode,
        pub(crate) blocks: Vec<Block>,
    }

    impl Chain {
        pub fn new(difficulty: usize) -> Self {
            Self::with_config(ChainConfig::new(difficulty))
        }

        pub fn with_config(config: ChainConfig) -> Self {
            debug!(
                "creating chain with difficulty {} ({:?} validation)",
                config.difficulty, config.validation
            );
            Self {
                difficulty: config.difficulty,
                validation: config.validation,
                blocks: vec![Block::genesis()],
            }
        }

        /// Rebuild a chain from blocks obtained elsewhere. Only the genesis
        /// sentinels of the first block are checked; run [`Chain::validate`] afterwards.
        pub fn from_blocks(config: ChainConfig, blocks: Vec<Block>) -> Result<Self, ChainError> {
            match blocks.first() {
                Some(first)
                    if first.hash == GENESIS_HASH && first.previous_hash == GENESIS_HASH => {}
                _ => return Err(ChainError::MissingGenesis),
            }
            Ok(Self {
                difficulty: config.difficulty,
                validation: config.validation,
                blocks,
            })
        }

        pub fn difficulty(&self) -> usize {
            self.difficulty
        }

        pub fn validation(&self) -> ValidationMode {
            self.validation
        }

        pub fn blocks(&self) -> &[Block] {
            &self.blocks
        }

        pub fn len(&self) -> usize {
            self.blocks.len()
        }

        /// Always false: a chain holds at least its genesis block.
        pub fn is_empty(&self) -> bool {
            self.blocks.is_empty()
        }

        pub fn genesis(&self) -> &Block {
            &self.blocks[0]
        }

        pub fn tip(&self) -> &Block {
            &self.blocks[self.blocks.len() - 1]
        }

        /// Build a block on top of the tip, mine it and append it.
        ///
        /// Blocks for as long as mining takes. On a serialization failure the
        /// chain is left untouched.
        pub fn append(&mut self, payload: Payload) -> Result<&Block, ChainError> {
            let mut block = Block::new(self.tip().hash.clone(), payload);
            block.mine(self.difficulty)?;
            Ok(self.push(block))
        }

        /// Like [`Chain::append`], but mines on the rayon pool and gives up once
        /// `cancel` is set.
        pub fn append_parallel(
            &mut self,
            payload: Payload,
            cancel: &AtomicBool,
        ) -> Result<&Block, ChainError> {
            let mut block = Block::new(self.tip().hash.clone(), payload);
            crate::mine::mine_parallel(&mut block, self.difficulty, cancel)?;
            Ok(self.push(block))
        }

        fn push(&mut self, block: Block) -> &Block {
            info!(
                "Mined block {} with proof counter {} and hash {}",
                self.blocks.len(),
                block.proof_counter,
                block.hash
            );
            self.blocks.push(block);
            self.tip()
        }

        pub fn is_valid(&self) -> bool {
            self.validate().is_ok()
        }

        /// Walk blocks 1..len and report the first one that does not hold up.
        /// The genesis block is never checked.
        pub fn validate(&self) -> Result<(), ValidationError> {
            for (offset, pair) in self.blocks.windows(2).enumerate() {
                let (previous, current) = (&pair[0], &pair[1]);
                let index = offset + 1;

                // an unencodable payload cannot reproduce any stored hash
                let hash_matches = current
                    .compute_hash()
                    .map(|hash| hash == current.hash)
                    .unwrap_or(false);
                if !hash_matches {
                    return reject(ValidationError::HashMismatch { index });
                }
                if current.previous_hash != previous.hash {
                    return reject(ValidationError::BrokenLink { index });
                }
                if self.validation == ValidationMode::StrictProofOfWork
                    && !pow::meets_difficulty(&current.hash, self.difficulty)
                {
                    return reject(ValidationError::InsufficientWork {
                        index,
                        difficulty: self.difficulty,
                    });
                }
            }
            Ok(())
        }
    }

    fn reject(err: ValidationError) -> Result<(), ValidationError> {
        warn!("chain validation failed: {err}");
        Err(err)
    }
}
