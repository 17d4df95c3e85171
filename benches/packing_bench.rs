//! Benchmarks for curve simulation and bundle packing
//!
//! Benchmarks:
//! - Curve simulation over growing wallet counts
//! - Launch bundle packing (compile, measure, sign) per wallet count
//! - Extend-table chunking for a full session address set

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use launch_bundler::curve::{CurveSimulator, SimulationInput, LAMPORTS_PER_SOL};
use launch_bundler::tx_builder::{
    collect_session_addresses, AddressTableLifecycle, BuildContext, BundleBuilder, LaunchRequest, PlannedBuy,
    SessionAccounts,
};
use launch_bundler::types::TokenMetadata;
use solana_sdk::{
    hash::Hash,
    message::AddressLookupTableAccount,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};

struct Session {
    mint: Keypair,
    dev: Keypair,
    payer: Keypair,
    wallets: Vec<Keypair>,
    table: Pubkey,
}

impl Session {
    fn new(wallets: usize) -> Self {
        Self {
            mint: Keypair::new(),
            dev: Keypair::new(),
            payer: Keypair::new(),
            wallets: (0..wallets).map(|_| Keypair::new()).collect(),
            table: Pubkey::new_unique(),
        }
    }

    fn addresses(&self) -> Vec<Pubkey> {
        let wallets: Vec<Pubkey> = self.wallets.iter().map(|w| w.pubkey()).collect();
        collect_session_addresses(&SessionAccounts {
            mint: self.mint.pubkey(),
            wallets: &wallets,
            dev: self.dev.pubkey(),
            fee_payer: self.payer.pubkey(),
            table: self.table,
        })
    }

    fn inputs(&self) -> Vec<SimulationInput> {
        std::iter::once(&self.dev)
            .chain(&self.wallets)
            .map(|k| SimulationInput {
                identity: k.pubkey(),
                sol_input: LAMPORTS_PER_SOL as i64 / 2,
            })
            .collect()
    }
}

fn bench_curve_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("curve_simulation");
    for wallets in [6usize, 24, 96] {
        let session = Session::new(wallets);
        let inputs = session.inputs();
        group.bench_with_input(BenchmarkId::from_parameter(wallets), &inputs, |b, inputs| {
            let sim = CurveSimulator::default();
            b.iter(|| black_box(sim.simulate(black_box(inputs))));
        });
    }
    group.finish();
}

fn bench_launch_packing(c: &mut Criterion) {
    let mut group = c.benchmark_group("launch_packing");
    for wallets in [6usize, 24] {
        let session = Session::new(wallets);
        let report = CurveSimulator::default().simulate(&session.inputs());
        let buys: Vec<PlannedBuy<'_>> = std::iter::once(&session.dev)
            .chain(&session.wallets)
            .zip(&report.allocations)
            .map(|(wallet, a)| PlannedBuy {
                wallet,
                sol_input: a.sol_input,
                token_amount: a.token_output,
            })
            .collect();
        let ctx = BuildContext::new(Hash::new_unique(), 10_000_000).with_lookup_table(AddressLookupTableAccount {
            key: session.table,
            addresses: session.addresses(),
        });

        group.bench_function(BenchmarkId::from_parameter(wallets), |b| {
            b.iter(|| {
                let request = LaunchRequest {
                    metadata: TokenMetadata {
                        name: "Bench".into(),
                        symbol: "BNCH".into(),
                        uri: "https://example.invalid/bench.json".into(),
                    },
                    mint: &session.mint,
                    dev_buy: buys[0],
                    fee_payer: &session.payer,
                    wallet_buys: buys[1..].to_vec(),
                    slippage_bps: 500,
                };
                black_box(BundleBuilder::new(&ctx).launch(&request).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_extend_chunking(c: &mut Criterion) {
    let session = Session::new(60);
    let addresses = session.addresses();
    let ctx = BuildContext::new(Hash::new_unique(), 10_000_000);

    c.bench_function("extend_table_140_addresses", |b| {
        b.iter(|| {
            black_box(
                AddressTableLifecycle::new(&ctx)
                    .extend(&session.table, &session.payer, black_box(&addresses), None)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_curve_simulation, bench_launch_packing, bench_extend_chunking);
criterion_main!(benches);
