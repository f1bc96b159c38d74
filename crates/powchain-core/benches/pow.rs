use criterion::{criterion_group, criterion_main, Criterion};
use powchain_core::{constants::GENESIS_HASH, mine::mine_parallel, Block, Chain, Payload};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::AtomicBool;

fn candidate(rng: &mut StdRng) -> Block {
    let payload = Payload::new()
        .with("from", format!("alice-{}", rng.gen_range(0..10)))
        .with("to", "bob")
        .with("amount", rng.gen_range(1..10));
    Block::new(GENESIS_HASH, payload)
}

fn bench_pow(c: &mut Criterion) {
    c.bench_function("mine_block_difficulty_3", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let block = candidate(&mut rng);

        b.iter(|| {
            let mut mined = block.clone();
            mined.mine(3).unwrap();
        });
    });

    c.bench_function("mine_parallel_difficulty_3", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let block = candidate(&mut rng);
        let cancel = AtomicBool::new(false);

        b.iter(|| {
            let mut mined = block.clone();
            mine_parallel(&mut mined, 3, &cancel).unwrap();
        });
    });

    c.bench_function("validate_chain_of_50", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let mut chain = Chain::new(1);
        for _ in 0..50 {
            chain.append(candidate(&mut rng).payload).unwrap();
        }

        b.iter(|| assert!(chain.is_valid()));
    });
}

fn bench_sequential_vs_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("mine_difficulty_5");
    group.sample_size(10);
    let mut rng = StdRng::seed_from_u64(7);
    let block = candidate(&mut rng);
    let cancel = AtomicBool::new(false);

    group.bench_function("sequential", |b| {
        b.iter(|| {
            let mut mined = block.clone();
            mined.mine(5).unwrap();
        });
    });
    group.bench_function("parallel", |b| {
        b.iter(|| {
            let mut mined = block.clone();
            mine_parallel(&mut mined, 5, &cancel).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_pow, bench_sequential_vs_parallel);
criterion_main!(benches);
