use hashchain_core::{
    chain::Chain, pow::CancelFlag, ChainError, Difficulty, MiningStrategy, SharedChain,
};
use rand::Rng;
use std::collections::HashSet;
use tokio::task;

fn shared_chain(bits: u32) -> SharedChain {
    SharedChain::new(Chain::new(Difficulty::new(bits).unwrap()))
}

#[tokio::test]
async fn test_concurrent_mining_serializes_appends() -> anyhow::Result<()> {
    let chain = shared_chain(8);
    let cancel = CancelFlag::new();
    let num_miners = 16;
    let mut handles = Vec::new();
    for i in 0..num_miners {
        let chain = chain.clone();
        let cancel = cancel.clone();
        handles.push(task::spawn_blocking(move || {
            chain.mine_block(format!("miner-{i}"), &cancel)
        }));
    }
    let mut indices = HashSet::new();
    for handle in handles {
        let block = handle.await??;
        assert!(indices.insert(block.index()), "index handed out twice");
    }

    let blocks = chain.snapshot()?;
    assert_eq!(blocks.len(), num_miners + 1);
    assert_eq!(indices, (1..=num_miners as u64).collect::<HashSet<_>>());
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.index(), i as u64);
    }
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].previous_hash(), pair[0].hash());
    }
    assert!(chain.is_chain_valid()?);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_readers_see_whole_blocks() -> anyhow::Result<()> {
    let chain = shared_chain(6).with_strategy(MiningStrategy::Parallel);
    let cancel = CancelFlag::new();

    let writer = {
        let chain = chain.clone();
        let cancel = cancel.clone();
        task::spawn_blocking(move || -> Result<(), ChainError> {
            let mut rng = rand::thread_rng();
            for _ in 0..10 {
                let payload: Vec<u8> = (0..rng.gen_range(1..64)).map(|_| rng.gen()).collect();
                chain.mine_block(payload, &cancel)?;
            }
            Ok(())
        })
    };

    let reader = {
        let chain = chain.clone();
        task::spawn_blocking(move || -> Result<(), ChainError> {
            for _ in 0..50 {
                let snapshot = chain.snapshot()?;
                assert!(!snapshot.is_empty());
                assert!(snapshot.iter().all(|b| b.has_valid_hash()));
                chain.validate()?;
            }
            Ok(())
        })
    };

    writer.await??;
    reader.await??;
    assert_eq!(chain.len()?, 11);
    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_in_flight_mining() -> anyhow::Result<()> {
    let chain = SharedChain::new(Chain::new(Difficulty::new(4)?));
    let cancel = CancelFlag::new();
    cancel.cancel();
    let handle = {
        let chain = chain.clone();
        let cancel = cancel.clone();
        task::spawn_blocking(move || chain.mine_block("unreachable", &cancel))
    };
    assert!(matches!(handle.await?, Err(ChainError::Cancelled)));
    assert_eq!(chain.len()?, 1);
    Ok(())
}
