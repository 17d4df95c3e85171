//! Session pipeline
//!
//! Orchestrates one session action end to end: read what the action needs
//! from the ledger, build the bundle against a fresh [`BuildContext`], hand it
//! to the relay, and persist session state only once the relay accepts.
//!
//! Each action runs under its own [`TraceContext`], so every log line from the
//! build and the relay call carries the same correlation id.

use futures::future::join_all;
use rand::seq::SliceRandom;
use solana_sdk::{message::AddressLookupTableAccount, pubkey::Pubkey, signature::Keypair, signer::Signer};
use spl_associated_token_account::get_associated_token_address;
use std::future::Future;
use tracing::{info, Instrument};

use crate::config::Config;
use crate::curve::{with_premium_bps, CurveSimulator, SimulationInput, SimulationReport, TOTAL_SUPPLY};
use crate::metrics::with_metrics;
use crate::observability::TraceContext;
use crate::rpc_manager::{retry_with_backoff, LedgerClient, RpcResult};
use crate::session::{SessionError, SessionFile, SessionStore};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{
    await_landing, collect_session_addresses, resolve_buys, submit_bundle, wait_for_table, AddressTableLifecycle,
    BuildContext, BuildResult, Bundle, BundleBuilder, BundleOutcome, Bundler, DistributeRequest, Holding, LaunchRequest,
    PoolKeys, PumpCurveKeys, RaydiumAmmKeys, ReclaimRequest, SellRequest, SessionAccounts, TransactionBuilderError,
};
use crate::types::{ActionKind, SupplyBasis, SupplySource, TokenMetadata};
use crate::wallet::{Identity, SessionIdentities};

/// Pool a sell bundle targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolChoice {
    /// The mint's bonding curve
    Curve,
    /// Raydium AMM v4 pool bound to this OpenBook market
    Raydium { market: Pubkey },
}

/// Operator choices for a sell
#[derive(Debug, Clone)]
pub struct SellOptions {
    pub percent_bps: u16,
    pub supply_source: SupplySource,
    pub pool: PoolChoice,
    /// Index of the wallet paying the sell envelope, random when `None`
    pub sell_payer: Option<usize>,
    pub min_sol_output: u64,
}

/// Accepted table creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCreated {
    pub table: Pubkey,
    pub bundle_id: String,
}

/// Result of an extension, `bundle_id` is `None` when the table was complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExtended {
    pub table: Pubkey,
    pub mint: Pubkey,
    pub bundle_id: Option<String>,
    pub addresses: usize,
}

/// Drives session actions against a ledger and a relay
pub struct SessionEngine<L, B> {
    ledger: L,
    bundler: B,
    store: SessionStore,
    config: Config,
}

impl<L, B> SessionEngine<L, B>
where
    L: LedgerClient,
    B: Bundler,
{
    pub fn new(ledger: L, bundler: B, store: SessionStore, config: Config) -> Self {
        Self {
            ledger,
            bundler,
            store,
            config,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn bundler(&self) -> &B {
        &self.bundler
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn read<T, F, Fut>(&self, operation: &str, f: F) -> RpcResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        retry_with_backoff(operation, &self.config.rpc_retry_policy(), f).await
    }

    /// Fresh blockhash plus the configured budget and tip
    async fn context(&self, trace: &TraceContext) -> BuildResult<BuildContext> {
        let blockhash = self
            .read("get_latest_blockhash", || self.ledger.get_latest_blockhash())
            .await
            .map_err(|e| TransactionBuilderError::Blockhash(e.to_string()))?;
        Ok(BuildContext::new(blockhash, self.config.relay.tip_lamports)
            .with_budget(self.config.size_budget())
            .with_trace(trace.clone()))
    }

    /// Read the session table back, requiring every `expected` address
    async fn session_table(&self, session: &SessionFile, expected: &[Pubkey]) -> BuildResult<AddressLookupTableAccount> {
        let table = session.require_address_lut()?;
        wait_for_table(&self.ledger, &table, expected, &self.config.table_poll_policy()).await
    }

    /// Submit, optionally wait for landing, and return the bundle id
    async fn submit(&self, bundle: &Bundle, trace: &TraceContext) -> BuildResult<String> {
        let submit_trace = trace.child_span("submit");
        let mut outcome = submit_bundle(&self.bundler, bundle, &submit_trace).await;
        if self.config.relay.await_landing {
            if let BundleOutcome::Accepted(id) = &outcome {
                outcome = await_landing(&self.bundler, id, &self.config.status_poll_policy()).await;
            }
        }
        outcome.into_result()
    }

    fn session_accounts<'a>(&self, ids: &SessionIdentities, wallets: &'a [Pubkey], mint: Pubkey, table: Pubkey) -> SessionAccounts<'a> {
        SessionAccounts {
            mint,
            wallets,
            dev: ids.dev.pubkey(),
            fee_payer: ids.fee_payer.pubkey(),
            table,
        }
    }

    /// Create the session address table, recording it once accepted
    pub async fn create_table(&self, ids: &SessionIdentities) -> BuildResult<TableCreated> {
        let trace = TraceContext::new(ActionKind::CreateTable.label());
        self.create_table_inner(ids, &trace).instrument(trace.span()).await
    }

    async fn create_table_inner(&self, ids: &SessionIdentities, trace: &TraceContext) -> BuildResult<TableCreated> {
        let slot = self.read("get_finalized_slot", || self.ledger.get_finalized_slot()).await?;
        let ctx = self.context(trace).await?;
        let (bundle, table) = AddressTableLifecycle::new(&ctx).create(ids.fee_payer.keypair(), slot)?;
        let bundle_id = self.submit(&bundle, trace).await?;

        self.store.update(|s| {
            s.set_address_lut(table);
            Ok(())
        })?;
        info!(table = %table, bundle_id = %bundle_id, "Address table created");
        Ok(TableCreated { table, bundle_id })
    }

    /// Fill the session table and fix the mint identity
    ///
    /// The mint comes from `import` (base58 secret) when given, then from the
    /// session, and is generated otherwise. A table that already holds every
    /// address is not touched.
    pub async fn extend_table(&self, ids: &SessionIdentities, import: Option<&str>) -> BuildResult<TableExtended> {
        let trace = TraceContext::new(ActionKind::ExtendTable.label());
        self.extend_table_inner(ids, import, &trace).instrument(trace.span()).await
    }

    async fn extend_table_inner(&self, ids: &SessionIdentities, import: Option<&str>, trace: &TraceContext) -> BuildResult<TableExtended> {
        let session = self.store.load()?;
        let table = session.require_address_lut()?;
        let mint = match import {
            Some(secret) => Identity::from_base58(secret)
                .map_err(|e| TransactionBuilderError::validation(e.to_string()))?
                .into_keypair(),
            None => session.mint_keypair()?.unwrap_or_else(Keypair::new),
        };
        let mint_pubkey = mint.pubkey();

        let wallets = ids.wallet_pubkeys();
        let addresses = collect_session_addresses(&self.session_accounts(ids, &wallets, mint_pubkey, table));
        let current = self
            .read("get_lookup_table", || self.ledger.get_lookup_table(&table))
            .await?;

        let ctx = self.context(trace).await?;
        let bundle = AddressTableLifecycle::new(&ctx).extend(&table, ids.fee_payer.keypair(), &addresses, current.as_ref())?;

        let bundle_id = match bundle {
            Some(bundle) => Some(self.submit(&bundle, trace).await?),
            None => None,
        };
        if session.mint()? != Some(mint_pubkey) {
            self.store.update(|s| {
                s.set_mint(&mint);
                Ok(())
            })?;
        }

        wait_for_table(&self.ledger, &table, &addresses, &self.config.table_poll_policy()).await?;
        info!(table = %table, mint = %mint_pubkey, addresses = addresses.len(), "Address table ready");
        Ok(TableExtended {
            table,
            mint: mint_pubkey,
            bundle_id,
            addresses: addresses.len(),
        })
    }

    /// Run the curve simulation without touching the session
    ///
    /// `wallet_lamports` holds one amount per wallet, or a single amount used
    /// for every wallet. The dev amount carries the configured premium.
    pub fn preview_simulation(
        &self,
        ids: &SessionIdentities,
        dev_lamports: i64,
        wallet_lamports: &[i64],
    ) -> BuildResult<SimulationReport> {
        let wallets = ids.wallet_pubkeys();
        let amounts: Vec<i64> = match wallet_lamports {
            [single] => vec![*single; wallets.len()],
            many if many.len() == wallets.len() => many.to_vec(),
            many => {
                return Err(TransactionBuilderError::validation(format!(
                    "{} wallet amounts given for {} wallets",
                    many.len(),
                    wallets.len()
                )))
            }
        };

        let dev_input = if dev_lamports > 0 {
            with_premium_bps(dev_lamports as u64, u32::from(self.config.bundle.dev_premium_bps)).min(i64::MAX as u64) as i64
        } else {
            dev_lamports
        };
        let inputs: Vec<SimulationInput> = std::iter::once(SimulationInput {
            identity: ids.dev.pubkey(),
            sol_input: dev_input,
        })
        .chain(wallets.iter().zip(amounts).map(|(identity, sol_input)| SimulationInput {
            identity: *identity,
            sol_input,
        }))
        .collect();

        Ok(CurveSimulator::default().simulate(&inputs))
    }

    /// Simulate and replace every identity's allocation with the new run
    ///
    /// Identities skipped by this run lose their earlier allocation.
    pub fn simulate(&self, ids: &SessionIdentities, dev_lamports: i64, wallet_lamports: &[i64]) -> BuildResult<SimulationReport> {
        let report = self.preview_simulation(ids, dev_lamports, wallet_lamports)?;
        self.store.update(|s| s.record_simulation(&report))?;
        info!(
            allocations = report.allocations.len(),
            skipped = report.skipped.len(),
            total_tokens = report.total_tokens(),
            total_percent = report.total_percent(),
            "Simulation recorded"
        );
        Ok(report)
    }

    /// Fund dev and wallets for their recorded buys
    ///
    /// Each identity receives `sol_input` plus the configured premium and a
    /// flat amount for rent and fees.
    pub async fn distribute(&self, ids: &SessionIdentities) -> BuildResult<String> {
        let trace = TraceContext::new(ActionKind::Distribute.label());
        self.distribute_inner(ids, &trace).instrument(trace.span()).await
    }

    async fn distribute_inner(&self, ids: &SessionIdentities, trace: &TraceContext) -> BuildResult<String> {
        let session = self.store.load()?;
        let logger = StructuredLogger::for_trace(trace);
        let mut transfers = Vec::with_capacity(ids.wallets.len() + 1);
        for identity in std::iter::once(&ids.dev).chain(&ids.wallets) {
            let pubkey = identity.pubkey();
            let Some(record) = session.allocation(&pubkey)? else {
                logger.log_wallet_skipped(&pubkey, "no allocation recorded");
                continue;
            };
            let sol = record.sol_lamports()?;
            if sol == 0 {
                logger.log_wallet_skipped(&pubkey, "zero allocation");
                continue;
            }
            let amount = with_premium_bps(sol, u32::from(self.config.bundle.distribute_premium_bps))
                .saturating_add(self.config.bundle.distribute_flat_lamports);
            transfers.push((pubkey, amount));
        }

        let table = self.session_table(&session, &[]).await?;
        let ctx = self.context(trace).await?.with_lookup_table(table);
        let bundle = BundleBuilder::new(&ctx).distribute(&DistributeRequest {
            fee_payer: ids.fee_payer.keypair(),
            transfers,
        })?;
        self.submit(&bundle, trace).await
    }

    /// Create the token and run every recorded buy in one bundle
    pub async fn launch(&self, ids: &SessionIdentities, metadata: TokenMetadata) -> BuildResult<String> {
        let trace = TraceContext::new(ActionKind::Launch.label());
        self.launch_inner(ids, metadata, &trace).instrument(trace.span()).await
    }

    async fn launch_inner(&self, ids: &SessionIdentities, metadata: TokenMetadata, trace: &TraceContext) -> BuildResult<String> {
        let session = self.store.load()?;
        let mint = session.require_mint_keypair()?;
        let logger = StructuredLogger::for_trace(trace);

        let dev_buy = resolve_buys(&[ids.dev.keypair()], &session, &logger)?
            .into_iter()
            .next()
            .ok_or_else(|| TransactionBuilderError::validation("dev identity has no allocation, run simulate first"))?;
        let wallet_buys = resolve_buys(&ids.wallet_keypairs(), &session, &logger)?;

        let wallets = ids.wallet_pubkeys();
        let table = session.require_address_lut()?;
        let expected = collect_session_addresses(&self.session_accounts(ids, &wallets, mint.pubkey(), table));
        let table = self.session_table(&session, &expected).await?;

        let ctx = self.context(trace).await?.with_lookup_table(table);
        let bundle = BundleBuilder::new(&ctx).launch(&LaunchRequest {
            metadata,
            mint: &mint,
            dev_buy,
            fee_payer: ids.fee_payer.keypair(),
            wallet_buys,
            slippage_bps: self.config.bundle.buy_slippage_bps,
        })?;
        let bundle_id = self.submit(&bundle, trace).await?;
        info!(mint = %mint.pubkey(), bundle_id = %bundle_id, "Launch accepted");
        Ok(bundle_id)
    }

    /// Balance read under the rpc policy, `None` once the policy is exhausted
    async fn balance_or_skip<F, Fut>(&self, wallet: &Pubkey, operation: &str, logger: &StructuredLogger, f: F) -> Option<u64>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RpcResult<u64>>,
    {
        match self.read(operation, f).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                with_metrics(|m| m.wallets_skipped.inc());
                logger.log_wallet_skipped(wallet, &format!("balance unavailable: {e}"));
                None
            }
        }
    }

    /// Token balances of each owner's associated account, read concurrently
    async fn token_balances(&self, owners: &[Pubkey], mint: &Pubkey, logger: &StructuredLogger) -> Vec<Option<u64>> {
        let ledger = &self.ledger;
        let reads = owners.iter().map(|owner| {
            let ata = get_associated_token_address(owner, mint);
            async move {
                self.balance_or_skip(owner, "get_token_balance", logger, || ledger.get_token_balance(&ata))
                    .await
            }
        });
        join_all(reads).await
    }

    async fn resolve_supply(&self, source: SupplySource, mint: &Pubkey) -> BuildResult<SupplyBasis> {
        Ok(match source {
            SupplySource::Live => SupplyBasis::Live(self.read("get_token_supply", || self.ledger.get_token_supply(mint)).await?),
            SupplySource::Simulated => SupplyBasis::Simulated(TOTAL_SUPPLY),
        })
    }

    async fn resolve_pool(&self, choice: &PoolChoice, mint: Pubkey) -> BuildResult<PoolKeys> {
        match choice {
            PoolChoice::Curve => Ok(PoolKeys::PumpCurve(PumpCurveKeys::new(mint))),
            PoolChoice::Raydium { market } => {
                let account = self
                    .read("get_market_account", || self.ledger.get_account(market))
                    .await?
                    .ok_or_else(|| TransactionBuilderError::validation(format!("market {market} not found")))?;
                Ok(PoolKeys::RaydiumAmmV4(RaydiumAmmKeys::from_market(*market, &account.data, mint)?))
            }
        }
    }

    /// Sell a share of every holding through the chosen pool
    pub async fn sell(&self, ids: &SessionIdentities, options: &SellOptions) -> BuildResult<String> {
        let trace = TraceContext::new(ActionKind::Sell.label());
        self.sell_inner(ids, options, &trace).instrument(trace.span()).await
    }

    async fn sell_inner(&self, ids: &SessionIdentities, options: &SellOptions, trace: &TraceContext) -> BuildResult<String> {
        let session = self.store.load()?;
        let mint = session.mint()?.ok_or(SessionError::Missing("mint"))?;

        let logger = StructuredLogger::for_trace(trace);
        let owners: Vec<Pubkey> = std::iter::once(ids.dev.pubkey()).chain(ids.wallet_pubkeys()).collect();
        let balances = self.token_balances(&owners, &mint, &logger).await;
        let supply = self.resolve_supply(options.supply_source, &mint).await?;
        let pool = self.resolve_pool(&options.pool, mint).await?;

        let sell_payer = match options.sell_payer {
            Some(index) => ids.wallets.get(index).ok_or_else(|| {
                TransactionBuilderError::validation(format!("no wallet at index {index}"))
            })?,
            None => ids.wallets.choose(&mut rand::thread_rng()).unwrap_or(&ids.fee_payer),
        };

        let table = self.session_table(&session, &[]).await?;
        let ctx = self.context(trace).await?.with_lookup_table(table);
        let bundle = BundleBuilder::new(&ctx).sell(&SellRequest {
            pool,
            fee_payer: ids.fee_payer.keypair(),
            sell_payer: sell_payer.keypair(),
            dev: Holding {
                wallet: ids.dev.keypair(),
                balance: balances[0].unwrap_or(0),
            },
            wallets: ids
                .wallets
                .iter()
                .zip(&balances[1..])
                .filter_map(|(identity, balance)| {
                    balance.map(|balance| Holding {
                        wallet: identity.keypair(),
                        balance,
                    })
                })
                .collect(),
            percent_bps: options.percent_bps,
            supply,
            min_sol_output: options.min_sol_output,
        })?;
        self.submit(&bundle, trace).await
    }

    /// Return every wallet's lamports to the fee payer
    pub async fn reclaim(&self, ids: &SessionIdentities) -> BuildResult<String> {
        let trace = TraceContext::new(ActionKind::Reclaim.label());
        self.reclaim_inner(ids, &trace).instrument(trace.span()).await
    }

    async fn reclaim_inner(&self, ids: &SessionIdentities, trace: &TraceContext) -> BuildResult<String> {
        let session = self.store.load()?;
        let logger = StructuredLogger::for_trace(trace);
        let ledger = &self.ledger;
        let logger = &logger;
        let reads = ids.wallets.iter().map(|identity| async move {
            let pubkey = identity.pubkey();
            self.balance_or_skip(&pubkey, "get_balance", logger, || ledger.get_balance(&pubkey))
                .await
                .map(|balance| (identity.keypair(), balance))
        });
        let wallets: Vec<(&Keypair, u64)> = join_all(reads).await.into_iter().flatten().collect();

        let table = self.session_table(&session, &[]).await?;
        let ctx = self.context(trace).await?.with_lookup_table(table);
        let bundle = BundleBuilder::new(&ctx).reclaim(&ReclaimRequest {
            fee_payer: ids.fee_payer.keypair(),
            wallets,
        })?;
        self.submit(&bundle, trace).await
    }
}
