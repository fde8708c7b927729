//! Chain engine benchmarks for netlock

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use netlock::authority::{Aum, AumMessage, Chain, State, StateId, VerifiedAum};
use netlock::crypto::{AumHash, Identity};
use std::hint::black_box;

fn genesis(identity: &Identity) -> VerifiedAum {
    // Commitment bytes are opaque to the engine; skip the KDF here.
    let state = State::new(vec![identity.key(1)], vec![vec![7u8; 32]], StateId(1, 1));
    VerifiedAum::verify(Aum::new(AumMessage::Checkpoint(state))).unwrap()
}

fn history(identity: &Identity, len: usize) -> Vec<VerifiedAum> {
    let mut aums = vec![genesis(identity)];
    for _ in 0..len {
        let mut aum = Aum::with_parent(AumMessage::NoOp, aums[aums.len() - 1].hash());
        aum.sign(identity).unwrap();
        aums.push(VerifiedAum::verify(aum).unwrap());
    }
    aums
}

fn benchmark_hashing(c: &mut Criterion) {
    let identity = Identity::generate();
    let aum = history(&identity, 1).pop().unwrap().into_aum();

    c.bench_function("content_hash", |b| {
        b.iter(|| black_box(aum.content_hash().unwrap()))
    });
    c.bench_function("signing_hash", |b| {
        b.iter(|| black_box(aum.signing_hash().unwrap()))
    });
}

fn benchmark_verification(c: &mut Criterion) {
    let identity = Identity::generate();
    let raw = history(&identity, 1)[1].raw().to_vec();

    c.bench_function("decode_and_verify", |b| {
        b.iter(|| black_box(VerifiedAum::from_bytes(black_box(&raw), raw.len()).unwrap()))
    });
}

fn benchmark_apply(c: &mut Criterion) {
    let identity = Identity::generate();
    let mut group = c.benchmark_group("apply_linear_chain");

    for len in [10usize, 100, 1000] {
        let aums = history(&identity, len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &aums, |b, aums| {
            b.iter(|| {
                let mut chain = Chain::new();
                for aum in aums {
                    chain.submit(aum.clone()).unwrap();
                }
                black_box(chain.head())
            })
        });
    }
    group.finish();
}

fn benchmark_fork_resolution(c: &mut Criterion) {
    let identity = Identity::generate();
    let g = genesis(&identity);
    let forks: Vec<VerifiedAum> = (0u8..100)
        .map(|i| {
            let mut aum = Aum::with_parent(AumMessage::NoOp, g.hash());
            aum.state_hint = Some(State::new(Vec::new(), Vec::new(), StateId(u64::from(i), 0)));
            aum.sign(&identity).unwrap();
            VerifiedAum::verify(aum).unwrap()
        })
        .collect();

    c.bench_function("resolve_100_forks", |b| {
        b.iter(|| {
            let mut chain = Chain::new();
            chain.submit(g.clone()).unwrap();
            for fork in &forks {
                chain.submit(fork.clone()).unwrap();
            }
            black_box::<Option<AumHash>>(chain.head())
        })
    });
}

criterion_group!(
    benches,
    benchmark_hashing,
    benchmark_verification,
    benchmark_apply,
    benchmark_fork_resolution
);
criterion_main!(benches);
