//! Criterion benchmarks for coin selection and transaction planning.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cirrus_core::address::{Address, Network};
use cirrus_core::constants::COIN;
use cirrus_core::types::{Hash256, OutPoint, TxOutput, UnspentOutput};
use cirrus_wallet::{CoinSelector, PerKilobyteFee, SelectionTarget, TransactionBuilder, WalletConfig};

fn utxos(n: usize) -> Vec<UnspentOutput> {
    (0..n)
        .map(|i| UnspentOutput {
            outpoint: OutPoint::new(Hash256([(i % 251) as u8; 32]), i as u64),
            output: TxOutput {
                value: (i as u64 % 97 + 1) * COIN / 10,
                pubkey_hash: Hash256([0xAA; 32]),
            },
            block_height: (i % 500) as u64,
            is_coinbase: false,
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let policy = PerKilobyteFee::default();
    let mut group = c.benchmark_group("coin_select");
    for n in [10usize, 100, 1000] {
        let available = utxos(n);
        let target = SelectionTarget {
            payment: n as u64 * COIN / 8,
            fee_floor: 0,
            payment_outputs: 2,
            dust_threshold: 546,
            max_inputs: 1000,
        };
        group.bench_with_input(BenchmarkId::from_parameter(n), &available, |b, available| {
            b.iter(|| CoinSelector::select(black_box(available), &target, &policy))
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let policy = PerKilobyteFee::default();
    let available = utxos(500);
    let mut builder = TransactionBuilder::new(&WalletConfig::default());
    builder
        .add_payment(Address::from_pubkey_hash(Hash256([1; 32]), Network::Mainnet), 20 * COIN)
        .add_payment(Address::from_pubkey_hash(Hash256([2; 32]), Network::Mainnet), 5 * COIN);

    c.bench_function("plan_500_utxos", |b| {
        b.iter(|| builder.plan(black_box(&available), 1_000, Hash256([0xCC; 32]), &policy))
    });
}

criterion_group!(benches, bench_select, bench_plan);
criterion_main!(benches);
