use criterion::{criterion_group, criterion_main, Criterion};
use hashchain_core::{
    mine::mine_block_parallel,
    pow::{mine_block, CancelFlag},
    Block, Difficulty,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_payload(rng: &mut StdRng) -> Vec<u8> {
    (0..256).map(|_| rng.gen()).collect()
}

fn bench_pow(c: &mut Criterion) {
    let difficulty = Difficulty::new(16).unwrap();

    c.bench_function("mine_block_target_16", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let block = Block::new(1, random_payload(&mut rng), [0u8; 32]);

        b.iter(|| {
            let _mined = mine_block(block.clone(), difficulty);
        });
    });

    c.bench_function("mine_block_parallel_target_16", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let block = Block::new(1, random_payload(&mut rng), [0u8; 32]);
        let cancel = CancelFlag::new();

        b.iter(|| {
            let _mined = mine_block_parallel(block.clone(), difficulty, &cancel);
        });
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
