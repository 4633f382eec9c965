use crate::{pow::CancelFlag, Block, Difficulty};
use rayon::prelude::*;
use tracing::debug;

/// Searches nonces in parallel until the block hash has at least `difficulty`
/// leading zero bits. Any satisfying nonce may win, not necessarily the smallest.
/// Returns `None` if `cancel` is raised first.
pub fn mine_block_parallel(
    block: Block,
    difficulty: Difficulty,
    cancel: &CancelFlag,
) -> Option<Block> {
    if cancel.is_cancelled() {
        return None;
    }
    if difficulty.is_satisfied_by(block.hash()) {
        return Some(block);
    }

    // Only the nonce varies per attempt; the rest of the candidate is shared
    // read-only across rayon's workers.
    let template = &block;
    let found = (0u64..u64::MAX)
        .into_par_iter()
        .find_any(|nonce| {
            if cancel.is_cancelled() {
                return true;
            }
            let hash = crate::block_hash(
                template.index(),
                template.timestamp(),
                template.payload(),
                template.previous_hash(),
                *nonce,
            );
            difficulty.is_satisfied_by(&hash)
        })?;

    let mined = block.with_nonce(found);
    if !difficulty.is_satisfied_by(mined.hash()) {
        debug!("parallel search for block {} cancelled", mined.index());
        return None;
    }
    Some(mined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::count_leading_zero_bits;

    #[test]
    fn parallel_mining_satisfies_difficulty() {
        let block = Block::from_parts(4, b"parallel".to_vec(), [3u8; 32], 1_600_000_000, 0);
        let difficulty = Difficulty::new(12).unwrap();
        let mined = mine_block_parallel(block, difficulty, &CancelFlag::new()).unwrap();
        assert!(count_leading_zero_bits(mined.hash()) >= 12);
        assert!(mined.has_valid_hash());
        assert_eq!(mined.index(), 4);
        assert_eq!(mined.payload(), b"parallel");
    }

    #[test]
    fn parallel_mining_honours_cancellation() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let block = Block::from_parts(1, b"never".to_vec(), [0u8; 32], 1_600_000_000, 0);
        let difficulty = Difficulty::new(128).unwrap();
        assert!(mine_block_parallel(block, difficulty, &cancel).is_none());
    }
}
