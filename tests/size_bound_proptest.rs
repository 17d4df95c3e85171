//! Every envelope a bundle builder returns fits the packet ceiling
//!
//! Chunk counts follow the per-envelope cardinalities for any input size, and
//! the single tip always rides in the last envelope.

use launch_bundler::curve::{CurveSimulator, SimulationInput};
use launch_bundler::tx_builder::{
    collect_session_addresses, AddressTableLifecycle, BuildContext, Bundle, BundleBuilder, DistributeRequest,
    Holding, LaunchRequest, PlannedBuy, PoolKeys, PumpCurveKeys, RaydiumAmmKeys, ReclaimRequest, SellRequest,
    SessionAccounts,
};
use launch_bundler::types::{SupplyBasis, TokenMetadata};
use proptest::prelude::*;
use solana_sdk::{
    hash::Hash,
    message::AddressLookupTableAccount,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_program,
};

fn context(mut addresses: Vec<Pubkey>) -> BuildContext {
    addresses.push(system_program::id());
    BuildContext::new(Hash::new_unique(), 10_000_000).with_lookup_table(AddressLookupTableAccount {
        key: Pubkey::new_unique(),
        addresses,
    })
}

/// Keypairs of one session and the table its envelopes compress against
struct Session {
    mint: Keypair,
    dev: Keypair,
    payer: Keypair,
    wallets: Vec<Keypair>,
}

impl Session {
    fn new(n: usize) -> Self {
        Self {
            mint: Keypair::new(),
            dev: Keypair::new(),
            payer: Keypair::new(),
            wallets: (0..n).map(|_| Keypair::new()).collect(),
        }
    }

    fn ctx(&self) -> BuildContext {
        let wallets: Vec<Pubkey> = self.wallets.iter().map(|w| w.pubkey()).collect();
        let table = Pubkey::new_unique();
        let addresses = collect_session_addresses(&SessionAccounts {
            mint: self.mint.pubkey(),
            wallets: &wallets,
            dev: self.dev.pubkey(),
            fee_payer: self.payer.pubkey(),
            table,
        });
        BuildContext::new(Hash::new_unique(), 10_000_000)
            .with_lookup_table(AddressLookupTableAccount { key: table, addresses })
    }
}

fn raydium_keys(mint: Pubkey) -> RaydiumAmmKeys {
    RaydiumAmmKeys {
        mint,
        amm_id: Pubkey::new_unique(),
        authority: Pubkey::new_unique(),
        open_orders: Pubkey::new_unique(),
        target_orders: Pubkey::new_unique(),
        base_vault: Pubkey::new_unique(),
        quote_vault: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        market_authority: Pubkey::new_unique(),
        market_bids: Pubkey::new_unique(),
        market_asks: Pubkey::new_unique(),
        market_event_queue: Pubkey::new_unique(),
        market_base_vault: Pubkey::new_unique(),
        market_quote_vault: Pubkey::new_unique(),
    }
}

fn tips_only_on_last(bundle: &Bundle) -> bool {
    let envelopes = bundle.envelopes();
    let tips: usize = envelopes.iter().map(|e| e.tip_count).sum();
    tips == 1 && envelopes.last().is_some_and(|e| e.has_tip())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn distribute_envelopes_fit(n in 1usize..=200, lamports in 1u64..=10_000_000_000) {
        let payer = Keypair::new();
        let recipients: Vec<Pubkey> = (0..n).map(|_| Pubkey::new_unique()).collect();
        let ctx = context(recipients.clone());

        let bundle = BundleBuilder::new(&ctx)
            .distribute(&DistributeRequest {
                fee_payer: &payer,
                transfers: recipients.iter().map(|r| (*r, lamports)).collect(),
            })
            .unwrap();

        // transfers plus the tip, 45 instructions per envelope
        prop_assert_eq!(bundle.len(), (n + 1).div_ceil(45));
        prop_assert!(bundle.envelopes().iter().all(|e| e.size <= 1232));
        prop_assert!(bundle.envelopes().last().unwrap().has_tip());
    }

    #[test]
    fn reclaim_envelopes_fit(n in 1usize..=40) {
        let payer = Keypair::new();
        let wallets: Vec<Keypair> = (0..n).map(|_| Keypair::new()).collect();
        let ctx = context(vec![payer.pubkey()]);

        let bundle = BundleBuilder::new(&ctx)
            .reclaim(&ReclaimRequest {
                fee_payer: &payer,
                wallets: wallets.iter().map(|w| (w, 5_000_000)).collect(),
            })
            .unwrap();

        prop_assert_eq!(bundle.len(), n.div_ceil(7));
        prop_assert!(bundle.envelopes().iter().all(|e| e.size <= 1232));
        let tips: usize = bundle.envelopes().iter().map(|e| e.tip_count).sum();
        prop_assert_eq!(tips, 1);
    }

    #[test]
    fn launch_envelopes_fit(n in 0usize..=25, lamports in 10_000_000i64..=1_000_000_000) {
        let session = Session::new(n);
        let ctx = session.ctx();
        let inputs: Vec<SimulationInput> = std::iter::once(&session.dev)
            .chain(&session.wallets)
            .map(|k| SimulationInput { identity: k.pubkey(), sol_input: lamports })
            .collect();
        let report = CurveSimulator::default().simulate(&inputs);
        let buys: Vec<PlannedBuy<'_>> = std::iter::once(&session.dev)
            .chain(&session.wallets)
            .zip(&report.allocations)
            .map(|(wallet, a)| PlannedBuy { wallet, sol_input: a.sol_input, token_amount: a.token_output })
            .collect();

        let bundle = BundleBuilder::new(&ctx)
            .launch(&LaunchRequest {
                metadata: TokenMetadata {
                    name: "Token".into(),
                    symbol: "TKN".into(),
                    uri: "https://example.invalid/meta.json".into(),
                },
                mint: &session.mint,
                dev_buy: buys[0],
                fee_payer: &session.payer,
                wallet_buys: buys[1..].to_vec(),
                slippage_bps: 500,
            })
            .unwrap();

        // create envelope, then six wallets per swap envelope
        prop_assert_eq!(bundle.len(), 1 + n.div_ceil(6));
        prop_assert!(bundle.envelopes().iter().all(|e| e.size <= 1232));
        prop_assert!(tips_only_on_last(&bundle));
    }

    #[test]
    fn sell_envelopes_fit(
        n in 1usize..=25,
        balance in 10_000_000u64..=1_000_000_000_000,
        percent_bps in 1u16..=2_500,
        raydium in any::<bool>(),
    ) {
        let session = Session::new(n);
        let ctx = session.ctx();
        let mint = session.mint.pubkey();
        let pool = if raydium {
            PoolKeys::RaydiumAmmV4(raydium_keys(mint))
        } else {
            PoolKeys::PumpCurve(PumpCurveKeys::new(mint))
        };

        let bundle = BundleBuilder::new(&ctx)
            .sell(&SellRequest {
                pool,
                fee_payer: &session.payer,
                sell_payer: &session.wallets[0],
                dev: Holding { wallet: &session.dev, balance },
                wallets: session.wallets.iter().map(|wallet| Holding { wallet, balance }).collect(),
                percent_bps,
                supply: SupplyBasis::Simulated(u64::MAX / 2),
                min_sol_output: 0,
            })
            .unwrap();

        // transfer envelopes of six wallets, then the pool sell
        prop_assert_eq!(bundle.len(), n.div_ceil(6) + 1);
        prop_assert!(bundle.envelopes().iter().all(|e| e.size <= 1232));
        prop_assert!(tips_only_on_last(&bundle));
    }

    #[test]
    fn extend_envelopes_fit(n in 1usize..=200) {
        let authority = Keypair::new();
        let table = Pubkey::new_unique();
        let addresses: Vec<Pubkey> = (0..n).map(|_| Pubkey::new_unique()).collect();
        let ctx = BuildContext::new(Hash::new_unique(), 10_000_000);

        let bundle = AddressTableLifecycle::new(&ctx)
            .extend(&table, &authority, &addresses, None)
            .unwrap()
            .unwrap();

        prop_assert!(bundle.envelopes().iter().all(|e| e.size <= 1232));
        prop_assert!(tips_only_on_last(&bundle));
        // address count of each extend instruction, after its 4 byte tag
        let extended: u64 = bundle
            .envelopes()
            .iter()
            .map(|e| u64::from_le_bytes(e.tx.message.instructions()[0].data[4..12].try_into().unwrap()))
            .sum();
        prop_assert_eq!(extended, n as u64);
    }
}
