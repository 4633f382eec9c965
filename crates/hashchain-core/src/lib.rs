pub mod constants;
mod error;
pub mod mine;
mod shared;

use constants::{DEFAULT_DIFFICULTY, HASH_BITS, HASH_SIZE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub use error::{ChainError, ValidationError, ValidationFailure};
pub use shared::{MiningStrategy, SharedChain};

pub type Hash = [u8; HASH_SIZE];

/// Hex (de)serialization for digests and opaque payload bytes.
mod hex_bytes {
    use super::Hash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(D::Error::custom)
    }

    pub mod hash {
        use super::*;

        pub fn serialize<S: Serializer>(hash: &Hash, s: S) -> Result<S::Ok, S::Error> {
            super::serialize(hash, s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Hash, D::Error> {
            let s = String::deserialize(d)?;
            <Hash as hex::FromHex>::from_hex(s).map_err(D::Error::custom)
        }
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// SHA-256 over `index ‖ timestamp ‖ len(payload) ‖ payload ‖ previous_hash ‖ nonce`,
/// integers little-endian.
pub fn block_hash(
    index: u64,
    timestamp: u64,
    payload: &[u8],
    previous_hash: &Hash,
    nonce: u64,
) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(payload);
    hasher.update(previous_hash);
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest[..]);
    out
}

/// One chain entry. Fields are only reachable through accessors so the stored
/// hash always matches the rest of the block; deserialization rejects a hash
/// that does not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock")]
pub struct Block {
    pub(crate) index: u64,
    pub(crate) timestamp: u64,
    #[serde(serialize_with = "hex_bytes::serialize")]
    pub(crate) payload: Vec<u8>,
    pub(crate) nonce: u64,
    #[serde(serialize_with = "hex_bytes::hash::serialize")]
    pub(crate) previous_hash: Hash,
    #[serde(serialize_with = "hex_bytes::hash::serialize")]
    pub(crate) hash: Hash,
}

/// Wire form of a [`Block`] before its hash has been checked.
#[derive(Deserialize)]
struct RawBlock {
    index: u64,
    timestamp: u64,
    #[serde(deserialize_with = "hex_bytes::deserialize")]
    payload: Vec<u8>,
    nonce: u64,
    #[serde(deserialize_with = "hex_bytes::hash::deserialize")]
    previous_hash: Hash,
    #[serde(deserialize_with = "hex_bytes::hash::deserialize")]
    hash: Hash,
}

impl TryFrom<RawBlock> for Block {
    type Error = ValidationError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let block = Block::from_parts(
            raw.index,
            raw.payload,
            raw.previous_hash,
            raw.timestamp,
            raw.nonce,
        );
        if block.hash != raw.hash {
            return Err(ValidationError::new(raw.index, ValidationFailure::HashMismatch));
        }
        Ok(block)
    }
}

impl Block {
    /// Builds an unmined candidate stamped with the current time and nonce 0.
    pub fn new(index: u64, payload: impl Into<Vec<u8>>, previous_hash: Hash) -> Self {
        Self::from_parts(index, payload, previous_hash, now_secs(), 0)
    }

    /// Builds a block from explicit fields, computing its hash.
    pub fn from_parts(
        index: u64,
        payload: impl Into<Vec<u8>>,
        previous_hash: Hash,
        timestamp: u64,
        nonce: u64,
    ) -> Self {
        let payload = payload.into();
        let hash = block_hash(index, timestamp, &payload, &previous_hash, nonce);
        Self {
            index,
            timestamp,
            payload,
            nonce,
            previous_hash,
            hash,
        }
    }

    /// Same block with a different nonce and the matching hash.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self.hash = self.compute_hash();
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    /// The stored hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Re-derives the digest from the stored fields.
    pub fn compute_hash(&self) -> Hash {
        block_hash(
            self.index,
            self.timestamp,
            &self.payload,
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn has_valid_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }
}

/// Required number of leading zero bits in a block hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Difficulty(u32);

impl Difficulty {
    pub fn new(bits: u32) -> Result<Self, ChainError> {
        if bits > HASH_BITS {
            return Err(ChainError::InvalidDifficulty(bits));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_satisfied_by(self, hash: &Hash) -> bool {
        pow::count_leading_zero_bits(hash) >= self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(DEFAULT_DIFFICULTY)
    }
}

impl TryFrom<u32> for Difficulty {
    type Error = ChainError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::new(bits)
    }
}

impl From<Difficulty> for u32 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.0
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bits", self.0)
    }
}

pub mod pow {
    use super::{Block, Difficulty, Hash};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    /// Shared stop signal checked between nonce attempts.
    #[derive(Clone, Debug, Default)]
    pub struct CancelFlag(Arc<AtomicBool>);

    impl CancelFlag {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn cancel(&self) {
            self.0.store(true, Ordering::Relaxed);
        }

        pub fn is_cancelled(&self) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    /// Mine the block by incrementing nonce until the number of leading zero bits
    /// in the block hash >= `difficulty`.
    pub fn mine_block(mut block: Block, difficulty: Difficulty) -> Block {
        loop {
            if difficulty.is_satisfied_by(&block.hash) {
                return block;
            }
            let next = block.nonce.wrapping_add(1);
            block = block.with_nonce(next);
        }
    }

    /// Like [`mine_block`], but gives up with `None` once `cancel` is raised,
    /// including when it was raised before the search started.
    pub fn mine_block_cancellable(
        mut block: Block,
        difficulty: Difficulty,
        cancel: &CancelFlag,
    ) -> Option<Block> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if difficulty.is_satisfied_by(&block.hash) {
                return Some(block);
            }
            let next = block.nonce.wrapping_add(1);
            block = block.with_nonce(next);
        }
    }

    pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 8;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }
}

pub mod chain {
    use super::*;
    use crate::constants::{GENESIS_PAYLOAD, GENESIS_PREVIOUS_HASH};
    use tracing::{info, warn};

    /// Append-only sequence of mined blocks, never empty.
    #[derive(Clone, Debug)]
    pub struct Chain {
        pub(crate) blocks: Vec<Block>,
        pub(crate) difficulty: Difficulty,
    }

    impl Chain {
        pub fn new(difficulty: Difficulty) -> Self {
            Self::with_genesis_payload(difficulty, GENESIS_PAYLOAD)
        }

        pub fn with_genesis_payload(difficulty: Difficulty, payload: impl Into<Vec<u8>>) -> Self {
            let genesis = genesis_block(difficulty, payload);
            info!(
                "Mined genesis block with nonce {} and hash {}",
                genesis.nonce,
                hex::encode(genesis.hash)
            );
            Self {
                blocks: vec![genesis],
                difficulty,
            }
        }

        /// Like [`Chain::with_genesis_payload`], but stops with
        /// [`ChainError::Cancelled`] once `cancel` is raised.
        pub fn try_with_genesis_payload(
            difficulty: Difficulty,
            payload: impl Into<Vec<u8>>,
            cancel: &pow::CancelFlag,
        ) -> Result<Self, ChainError> {
            let candidate = Block::new(0, payload, GENESIS_PREVIOUS_HASH);
            let genesis = pow::mine_block_cancellable(candidate, difficulty, cancel)
                .ok_or(ChainError::Cancelled)?;
            info!(
                "Mined genesis block with nonce {} and hash {}",
                genesis.nonce,
                hex::encode(genesis.hash)
            );
            Ok(Self {
                blocks: vec![genesis],
                difficulty,
            })
        }

        pub fn difficulty(&self) -> Difficulty {
            self.difficulty
        }

        pub fn blocks(&self) -> &[Block] {
            &self.blocks
        }

        pub fn len(&self) -> usize {
            self.blocks.len()
        }

        pub fn is_empty(&self) -> bool {
            self.blocks.is_empty()
        }

        /// The current last block.
        pub fn previous_block(&self) -> &Block {
            self.blocks
                .last()
                .expect("chain always holds its genesis block")
        }

        /// Mines a block on top of the current last block and appends it.
        pub fn mine_block(&mut self, payload: impl Into<Vec<u8>>) -> &Block {
            let last = self.previous_block();
            let candidate = Block::new(last.index + 1, payload, last.hash);
            let mined = pow::mine_block(candidate, self.difficulty);
            info!(
                "Mined block {} with nonce {} and hash {}",
                mined.index,
                mined.nonce,
                hex::encode(mined.hash)
            );
            self.blocks.push(mined);
            self.previous_block()
        }

        /// Appends an externally mined block after checking it extends the
        /// current last block with valid work.
        pub(crate) fn append(&mut self, block: Block) -> Result<&Block, ChainError> {
            let last = self.previous_block();
            check_block(&block, last.index + 1, &last.hash, self.difficulty).map_err(|e| {
                ChainError::InternalConsistency(format!("refusing to append: {e}"))
            })?;
            self.blocks.push(block);
            Ok(self.previous_block())
        }

        pub fn is_chain_valid(&self) -> bool {
            self.validate().is_ok()
        }

        /// Walks the chain and reports the first block that fails.
        pub fn validate(&self) -> Result<(), ValidationError> {
            let Some(genesis) = self.blocks.first() else {
                return Err(ValidationError::new(0, ValidationFailure::EmptyChain));
            };
            check_block(genesis, 0, &GENESIS_PREVIOUS_HASH, self.difficulty)?;
            for (position, pair) in self.blocks.windows(2).enumerate() {
                let (prev, block) = (&pair[0], &pair[1]);
                check_block(block, position as u64 + 1, &prev.hash, self.difficulty)?;
            }
            Ok(())
        }
    }

    fn check_block(
        block: &Block,
        position: u64,
        expected_previous: &Hash,
        difficulty: Difficulty,
    ) -> Result<(), ValidationError> {
        let fail = |reason: ValidationFailure| -> Result<(), ValidationError> {
            warn!("block {position} failed validation: {reason}");
            Err(ValidationError::new(position, reason))
        };
        if block.index != position {
            return fail(ValidationFailure::IndexMismatch);
        }
        if block.previous_hash != *expected_previous {
            return fail(if position == 0 {
                ValidationFailure::GenesisPreviousHash
            } else {
                ValidationFailure::PreviousHashMismatch
            });
        }
        let recomputed = block.compute_hash();
        if recomputed != block.hash {
            return fail(ValidationFailure::HashMismatch);
        }
        if !difficulty.is_satisfied_by(&recomputed) {
            return fail(ValidationFailure::InsufficientWork);
        }
        Ok(())
    }

    /// Genesis block on the zeroed sentinel, mined under the chain difficulty.
    pub fn genesis_block(difficulty: Difficulty, payload: impl Into<Vec<u8>>) -> Block {
        let candidate = Block::new(0, payload, GENESIS_PREVIOUS_HASH);
        pow::mine_block(candidate, difficulty)
    }

    #[cfg(any(test, feature = "test-util"))]
    impl Chain {
        /// Overwrites a stored payload without rehashing.
        pub fn overwrite_payload(&mut self, index: usize, payload: impl Into<Vec<u8>>) {
            self.blocks[index].payload = payload.into();
        }
    }
}
