use crate::{
    chain::Chain,
    mine::mine_block_parallel,
    pow::{mine_block_cancellable, CancelFlag},
    Block, ChainError, Difficulty,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// How the proof-of-work search is executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MiningStrategy {
    /// Single-threaded, smallest satisfying nonce.
    #[default]
    Sequential,
    /// Spread across the rayon thread pool.
    Parallel,
}

impl MiningStrategy {
    pub fn mine(self, block: Block, difficulty: Difficulty, cancel: &CancelFlag) -> Option<Block> {
        match self {
            MiningStrategy::Sequential => mine_block_cancellable(block, difficulty, cancel),
            MiningStrategy::Parallel => mine_block_parallel(block, difficulty, cancel),
        }
    }
}

/// Cloneable handle to a chain shared between concurrent callers.
///
/// Readers get owned copies taken under the read lock. Mining searches without
/// holding any lock and only takes the write lock to append; a candidate whose
/// predecessor is no longer the last block is discarded and mined again.
#[derive(Clone, Debug)]
pub struct SharedChain {
    inner: Arc<RwLock<Chain>>,
    difficulty: Difficulty,
    strategy: MiningStrategy,
}

impl SharedChain {
    pub fn new(chain: Chain) -> Self {
        Self {
            difficulty: chain.difficulty(),
            inner: Arc::new(RwLock::new(chain)),
            strategy: MiningStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: MiningStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn strategy(&self) -> MiningStrategy {
        self.strategy
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Chain>, ChainError> {
        self.inner
            .read()
            .map_err(|_| ChainError::InternalConsistency("chain lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Chain>, ChainError> {
        self.inner
            .write()
            .map_err(|_| ChainError::InternalConsistency("chain lock poisoned".into()))
    }

    /// Copy of every block at the time of the call.
    pub fn snapshot(&self) -> Result<Vec<Block>, ChainError> {
        Ok(self.read()?.blocks().to_vec())
    }

    pub fn previous_block(&self) -> Result<Block, ChainError> {
        Ok(self.read()?.previous_block().clone())
    }

    pub fn len(&self) -> Result<usize, ChainError> {
        Ok(self.read()?.len())
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        self.read()?.validate()?;
        Ok(())
    }

    pub fn is_chain_valid(&self) -> Result<bool, ChainError> {
        Ok(self.read()?.is_chain_valid())
    }

    /// Mines `payload` onto the chain. Refuses while the chain is invalid and
    /// returns [`ChainError::Cancelled`] if `cancel` is raised mid-search.
    pub fn mine_block(
        &self,
        payload: impl Into<Vec<u8>>,
        cancel: &CancelFlag,
    ) -> Result<Block, ChainError> {
        let payload = payload.into();
        loop {
            let tip = {
                let chain = self.read()?;
                chain.validate()?;
                chain.previous_block().clone()
            };

            let candidate = Block::new(tip.index() + 1, payload.clone(), *tip.hash());
            let mined = self
                .strategy
                .mine(candidate, self.difficulty, cancel)
                .ok_or(ChainError::Cancelled)?;

            let mut chain = self.write()?;
            if chain.previous_block().hash() != mined.previous_hash() {
                debug!(
                    "candidate {} went stale (chain now at {}), restarting search",
                    mined.index(),
                    chain.previous_block().index()
                );
                continue;
            }
            let appended = chain.append(mined)?;
            info!(
                "Mined block {} with nonce {} and hash {}",
                appended.index(),
                appended.nonce(),
                hex::encode(appended.hash())
            );
            return Ok(appended.clone());
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn overwrite_payload(&self, index: usize, payload: impl Into<Vec<u8>>) {
        if let Ok(mut chain) = self.inner.write() {
            chain.overwrite_payload(index, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(bits: u32) -> SharedChain {
        SharedChain::new(Chain::new(Difficulty::new(bits).unwrap()))
    }

    #[test]
    fn mine_and_read_back() {
        let chain = shared(8);
        let mined = chain.mine_block("hello", &CancelFlag::new()).unwrap();
        assert_eq!(mined.index(), 1);
        assert_eq!(chain.previous_block().unwrap(), mined);
        assert_eq!(chain.len().unwrap(), 2);
        assert!(chain.is_chain_valid().unwrap());
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let chain = shared(4);
        let before = chain.snapshot().unwrap();
        chain.mine_block("more", &CancelFlag::new()).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(chain.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn invalid_chain_refuses_mining() {
        let chain = shared(4);
        chain.mine_block("one", &CancelFlag::new()).unwrap();
        chain.overwrite_payload(1, "two");
        let err = chain.mine_block("three", &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, ChainError::ChainInvalid(_)));
        assert_eq!(chain.len().unwrap(), 2);
        assert!(chain.validate().is_err());
    }

    #[test]
    fn cancelled_mining_leaves_chain_unchanged() {
        let chain = shared(8);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = chain.mine_block("never", &cancel);
        assert!(matches!(err, Err(ChainError::Cancelled)));
        assert_eq!(chain.len().unwrap(), 1);
    }

    #[test]
    fn parallel_strategy_produces_valid_chain() {
        let chain = shared(10).with_strategy(MiningStrategy::Parallel);
        for i in 0..3 {
            chain.mine_block(format!("p{i}"), &CancelFlag::new()).unwrap();
        }
        assert_eq!(chain.len().unwrap(), 4);
        assert!(chain.is_chain_valid().unwrap());
    }
}
