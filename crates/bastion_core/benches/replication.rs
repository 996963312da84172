//! Replication benchmarks for bastion_core.
//!
//! Run with: `cargo bench -p bastion_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use bastion_core::client::ClientSession;
use bastion_core::components::ConnectionId;
use bastion_core::protocol::{decode_message, encode_message};
use bastion_core::router::Role;
use bastion_test_utils::fixtures::skirmish;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Server tick cost during an ongoing battle.
pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("skirmish_100_ticks", |b| {
        b.iter_with_setup(skirmish, |mut sim| {
            for _ in 0..100 {
                sim.tick().unwrap();
            }
            black_box(sim.state_hash())
        });
    });
}

/// Full path from server change to client replica, through the codec.
pub fn replica_benchmark(c: &mut Criterion) {
    c.bench_function("replicate_100_ticks", |b| {
        b.iter_with_setup(
            || {
                let mut sim = skirmish();
                sim.connect(ConnectionId(5)).unwrap();
                let client = ClientSession::new(Role::Client(ConnectionId(5))).unwrap();
                (sim, client)
            },
            |(mut sim, mut client)| {
                for _ in 0..100 {
                    sim.tick().unwrap();
                    for envelope in sim.drain_outbox() {
                        if envelope.target.includes(ConnectionId(5)) {
                            let bytes = encode_message(&envelope.message).unwrap();
                            client.on_message(decode_message(&bytes).unwrap());
                        }
                    }
                }
                black_box(client.entity_count())
            },
        );
    });
}

criterion_group!(benches, tick_benchmark, replica_benchmark);
criterion_main!(benches);
