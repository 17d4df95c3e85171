//! End-to-end session pipeline against the in-memory ledger and relay
//!
//! Runs every action in session order and checks what reached the relay and
//! what was persisted.

use launch_bundler::compat;
use launch_bundler::config::Config;
use launch_bundler::session::SessionStore;
use launch_bundler::test_utils::{MockBundler, MockLedger};
use launch_bundler::tx_builder::{collect_session_addresses, SessionAccounts, TransactionBuilderError};
use launch_bundler::types::{SupplySource, TokenMetadata};
use launch_bundler::wallet::{Identity, SessionIdentities};
use launch_bundler::{PoolChoice, SellOptions, SessionEngine};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use tempfile::TempDir;

const WALLETS: usize = 8;

fn identities() -> SessionIdentities {
    SessionIdentities {
        dev: Identity::from_keypair(Keypair::new()),
        fee_payer: Identity::from_keypair(Keypair::new()),
        wallets: (0..WALLETS).map(|_| Identity::from_keypair(Keypair::new())).collect(),
    }
}

fn engine(dir: &TempDir, bundler: MockBundler) -> SessionEngine<MockLedger, MockBundler> {
    let mut config = Config::default();
    config.rpc.retry_backoff_ms = 1;
    config.table.poll_interval_ms = 1;
    SessionEngine::new(
        MockLedger::new(),
        bundler,
        SessionStore::new(dir.path().join("keyInfo.json")),
        config,
    )
}

fn expected_addresses(ids: &SessionIdentities, mint: Pubkey, table: Pubkey) -> Vec<Pubkey> {
    let wallets = ids.wallet_pubkeys();
    collect_session_addresses(&SessionAccounts {
        mint,
        wallets: &wallets,
        dev: ids.dev.pubkey(),
        fee_payer: ids.fee_payer.pubkey(),
        table,
    })
}

#[tokio::test]
async fn test_full_session_pipeline() {
    let dir = TempDir::new().unwrap();
    let ids = identities();
    let engine = engine(&dir, MockBundler::new_success());
    let mint = Keypair::new();
    let mint_secret = bs58::encode(mint.to_bytes()).into_string();

    // create
    let created = engine.create_table(&ids).await.unwrap();
    assert_eq!(engine.store().load().unwrap().address_lut().unwrap(), Some(created.table));

    // extend, table becomes visible on the second read
    let addresses = expected_addresses(&ids, mint.pubkey(), created.table);
    engine
        .ledger()
        .set_lookup_table_after(created.table, addresses.clone(), 2);
    let extended = engine.extend_table(&ids, Some(&mint_secret)).await.unwrap();
    assert_eq!(extended.mint, mint.pubkey());
    assert_eq!(extended.addresses, addresses.len());
    assert!(extended.bundle_id.is_some());

    let session = engine.store().load().unwrap();
    assert_eq!(session.mint().unwrap(), Some(mint.pubkey()));
    assert_eq!(session.require_mint_keypair().unwrap().pubkey(), mint.pubkey());

    // simulate
    let report = engine
        .simulate(&ids, 1_000_000_000, &[500_000_000])
        .unwrap();
    assert_eq!(report.allocations.len(), WALLETS + 1);

    // distribute
    engine.distribute(&ids).await.unwrap();

    // launch
    let metadata = TokenMetadata {
        name: "Session".into(),
        symbol: "SESS".into(),
        uri: "https://example.invalid/session.json".into(),
    };
    engine.launch(&ids, metadata).await.unwrap();

    // sell 10% of every holding
    engine.ledger().set_token_supply(mint.pubkey(), 1_000_000_000_000_000);
    engine
        .ledger()
        .set_token_balance(&ids.dev.pubkey(), &mint.pubkey(), 100_000_000_000);
    for wallet in &ids.wallets {
        engine
            .ledger()
            .set_token_balance(&wallet.pubkey(), &mint.pubkey(), 10_000_000_000);
    }
    let options = SellOptions {
        percent_bps: 1_000,
        supply_source: SupplySource::Live,
        pool: PoolChoice::Curve,
        sell_payer: Some(0),
        min_sol_output: 0,
    };
    engine.sell(&ids, &options).await.unwrap();

    // reclaim
    for wallet in &ids.wallets {
        engine.ledger().set_balance(wallet.pubkey(), 50_000_000);
    }
    engine.reclaim(&ids).await.unwrap();

    let submitted = engine.bundler().submitted();
    let labels: Vec<&str> = submitted.iter().map(|b| b.label()).collect();
    assert_eq!(
        labels,
        vec!["create-table", "extend-table", "distribute", "launch", "sell", "reclaim"]
    );

    for bundle in &submitted {
        let tips: usize = bundle.envelopes().iter().map(|e| e.tip_count).sum();
        assert_eq!(tips, 1, "bundle {}", bundle.label());
        assert!(bundle.envelopes().last().unwrap().has_tip());
        assert!(bundle.envelopes().iter().all(|e| e.size <= 1232));
    }

    // 14 shared + 2 per wallet + 6 tail addresses: 30 then 6
    assert_eq!(submitted[1].len(), 2);
    assert!(submitted[1]
        .envelopes()
        .iter()
        .all(|e| !compat::is_compressed(&e.tx.message)));

    // create envelope then ceil(8 / 6) swap envelopes
    let launch = &submitted[3];
    assert_eq!(launch.len(), 3);
    assert_eq!(launch.envelopes()[0].fee_payer(), Some(&ids.dev.pubkey()));
    assert!(launch.envelopes()[1..]
        .iter()
        .all(|e| compat::is_compressed(&e.tx.message)));

    // two transfer envelopes and the sell envelope paid by wallet 0
    let sell = &submitted[4];
    assert_eq!(sell.len(), 3);
    assert_eq!(sell.envelopes()[2].fee_payer(), Some(&ids.wallets[0].pubkey()));

    // 8 wallets at 7 per envelope
    assert_eq!(submitted[5].len(), 2);
}

#[tokio::test]
async fn test_dropped_creation_leaves_session_untouched() {
    let dir = TempDir::new().unwrap();
    let ids = identities();
    let engine = engine(&dir, MockBundler::new_dropped());

    let err = engine.create_table(&ids).await.unwrap_err();
    assert!(matches!(err, TransactionBuilderError::SubmissionDropped(_)));
    assert!(err.is_retryable());
    assert!(!dir.path().join("keyInfo.json").exists());
    assert_eq!(engine.bundler().submission_count(), 1);
}

#[tokio::test]
async fn test_transport_error_is_not_retryable() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, MockBundler::new_failure());
    let err = engine.create_table(&identities()).await.unwrap_err();
    assert!(matches!(err, TransactionBuilderError::Transport(_)));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_table_never_visible_fails_after_bounded_polling() {
    let dir = TempDir::new().unwrap();
    let ids = identities();
    let mut config = Config::default();
    config.rpc.retry_backoff_ms = 1;
    let engine = SessionEngine::new(
        MockLedger::new(),
        MockBundler::new_success(),
        SessionStore::new(dir.path().join("keyInfo.json")),
        config,
    );

    let created = engine.create_table(&ids).await.unwrap();
    let err = engine.extend_table(&ids, None).await.unwrap_err();
    assert_eq!(err.category(), "resource");
    assert!(matches!(err, TransactionBuilderError::ResourceUnavailable { attempts: 20, .. }));

    // one read before building, then the 20 poll attempts
    assert_eq!(engine.ledger().lookup_table_reads(&created.table), 21);
}

#[tokio::test]
async fn test_launch_requires_simulated_dev_allocation() {
    let dir = TempDir::new().unwrap();
    let ids = identities();
    let engine = engine(&dir, MockBundler::new_success());
    let mint = Keypair::new();

    let created = engine.create_table(&ids).await.unwrap();
    engine
        .ledger()
        .set_lookup_table(created.table, expected_addresses(&ids, mint.pubkey(), created.table));
    let secret = bs58::encode(mint.to_bytes()).into_string();
    engine.extend_table(&ids, Some(&secret)).await.unwrap();

    let err = engine
        .launch(
            &ids,
            TokenMetadata {
                name: "A".into(),
                symbol: "A".into(),
                uri: "u".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransactionBuilderError::Validation(_)));
    // a complete table needs no extension bundle
    assert_eq!(engine.bundler().submission_count(), 1);
}
