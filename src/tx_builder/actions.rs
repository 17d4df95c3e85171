//! Bundle construction per session action
//!
//! Each action is a pure `build(request) -> Bundle` over an already fetched
//! `BuildContext`: no network access, no prompting. Packing rules shared by
//! every action:
//!
//! - independent signers are chunked (`wallets_per_swap`, `wallets_per_reclaim`,
//!   `transfers_per_envelope`), input order preserved
//! - every envelope is measured and rejected over the ceiling before signing
//! - exactly one tip per bundle, on the last envelope
//! - the fee payer signs first, then every wallet with instructions in the
//!   envelope

use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Keypair, signer::Signer, system_instruction};

use crate::curve::with_premium_bps;
use crate::metrics::{with_metrics, Timer};
use crate::session::SessionFile;
use crate::structured_logging::StructuredLogger;
use crate::types::{SupplyBasis, TokenMetadata};

use super::builder::{EnvelopeBuilder, EnvelopeRequest, SignerPool};
use super::context::BuildContext;
use super::errors::{BuildResult, TransactionBuilderError};
use super::instructions::{create_token_account, pump, tip_instruction, token_transfer};
use super::output::{Bundle, TransactionEnvelope};
use super::pool::PoolKeys;

/// Basis point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Largest share of supply one sell bundle may move, and the largest
/// per-holding percentage a Raydium sell accepts
pub const MAX_SELL_BPS: u16 = 2_500;

pub const LAUNCH_LABEL: &str = "launch";
pub const DEV_BUY_LABEL: &str = "create-and-dev-buy";
pub const WALLET_SWAP_LABEL: &str = "wallet-swap";
pub const DISTRIBUTE_LABEL: &str = "distribute";
pub const SELL_TRANSFER_LABEL: &str = "sell-transfer";
pub const SELL_LABEL: &str = "sell";
pub const RECLAIM_LABEL: &str = "reclaim";

/// One buy with amounts fixed by the curve simulation
#[derive(Clone, Copy)]
pub struct PlannedBuy<'a> {
    pub wallet: &'a Keypair,
    pub sol_input: u64,
    pub token_amount: u64,
}

impl std::fmt::Debug for PlannedBuy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedBuy")
            .field("wallet", &self.wallet.pubkey())
            .field("sol_input", &self.sol_input)
            .field("token_amount", &self.token_amount)
            .finish()
    }
}

/// Maximum SOL a buy may spend: `sol_input * (1 + slippage)`
pub fn max_sol_cost(sol_input: u64, slippage_bps: u16) -> u64 {
    with_premium_bps(sol_input, u32::from(slippage_bps))
}

/// Pair wallets with their recorded allocations
///
/// Wallets with no allocation or a zero amount are skipped with a warning.
pub fn resolve_buys<'a>(
    wallets: &[&'a Keypair],
    session: &SessionFile,
    logger: &StructuredLogger,
) -> BuildResult<Vec<PlannedBuy<'a>>> {
    let mut buys = Vec::with_capacity(wallets.len());
    for wallet in wallets {
        let pubkey = wallet.pubkey();
        let Some(record) = session.allocation(&pubkey)? else {
            with_metrics(|m| m.wallets_skipped.inc());
            logger.log_wallet_skipped(&pubkey, "no allocation recorded");
            continue;
        };
        let sol_input = record.sol_lamports()?;
        let token_amount = record.token_units()?;
        if sol_input == 0 || token_amount == 0 {
            with_metrics(|m| m.wallets_skipped.inc());
            logger.log_wallet_skipped(&pubkey, "zero allocation");
            continue;
        }
        buys.push(PlannedBuy {
            wallet: *wallet,
            sol_input,
            token_amount,
        });
    }
    Ok(buys)
}

/// Token creation, dev seed buy and wallet buys in one bundle
#[derive(Debug)]
pub struct LaunchRequest<'a> {
    pub metadata: TokenMetadata,
    pub mint: &'a Keypair,
    pub dev_buy: PlannedBuy<'a>,
    /// Pays token-account rent and fees of the wallet-swap envelopes
    pub fee_payer: &'a Keypair,
    pub wallet_buys: Vec<PlannedBuy<'a>>,
    pub slippage_bps: u16,
}

/// Lamport transfers from the fee payer, in order
#[derive(Debug)]
pub struct DistributeRequest<'a> {
    pub fee_payer: &'a Keypair,
    pub transfers: Vec<(Pubkey, u64)>,
}

/// A holder and its current token balance
#[derive(Clone, Copy)]
pub struct Holding<'a> {
    pub wallet: &'a Keypair,
    pub balance: u64,
}

impl std::fmt::Debug for Holding<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holding")
            .field("wallet", &self.wallet.pubkey())
            .field("balance", &self.balance)
            .finish()
    }
}

/// Proportional sell across the dev and wallet holdings
#[derive(Debug)]
pub struct SellRequest<'a> {
    pub pool: PoolKeys,
    /// Receives the tokens and owns the sell
    pub fee_payer: &'a Keypair,
    /// Pays the sell envelope (random wallet by default)
    pub sell_payer: &'a Keypair,
    pub dev: Holding<'a>,
    pub wallets: Vec<Holding<'a>>,
    pub percent_bps: u16,
    pub supply: SupplyBasis,
    pub min_sol_output: u64,
}

/// Sell volume per holder after applying the percentage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellPlan {
    pub dev_amount: u64,
    pub wallet_amounts: Vec<(Pubkey, u64)>,
    pub total: u64,
}

/// Full-balance return of every wallet to the fee payer
#[derive(Debug)]
pub struct ReclaimRequest<'a> {
    pub fee_payer: &'a Keypair,
    /// Wallets with their lamport balances
    pub wallets: Vec<(&'a Keypair, u64)>,
}

fn share(balance: u64, percent_bps: u16) -> u64 {
    (u128::from(balance) * u128::from(percent_bps) / u128::from(BPS_DENOMINATOR)) as u64
}

/// Compute per-holder sell amounts and enforce the price impact cap
///
/// Raydium sells reject a requested percentage over the cap. Every pool
/// rejects an aggregated volume at or over a quarter of `supply`. Nothing is
/// built when either trips.
pub fn plan_sell(request: &SellRequest<'_>, logger: &StructuredLogger) -> BuildResult<SellPlan> {
    if request.percent_bps == 0 || u64::from(request.percent_bps) > BPS_DENOMINATOR {
        return Err(TransactionBuilderError::validation(format!(
            "sell percentage must be within (0, 100]%, got {} bps",
            request.percent_bps
        )));
    }

    let dev_amount = share(request.dev.balance, request.percent_bps);
    let wallet_amounts: Vec<(Pubkey, u64)> = request
        .wallets
        .iter()
        .map(|h| (h.wallet.pubkey(), share(h.balance, request.percent_bps)))
        .collect();
    let total = wallet_amounts
        .iter()
        .fold(dev_amount, |acc, (_, amount)| acc.saturating_add(*amount));

    let supply = request.supply.amount();
    let cap = supply / 4;
    let over_percent =
        matches!(request.pool, PoolKeys::RaydiumAmmV4(_)) && request.percent_bps > MAX_SELL_BPS;
    let over_volume = u128::from(total) * 4 >= u128::from(supply);
    if over_percent || over_volume {
        with_metrics(|m| m.guardrail_rejections.inc());
        logger.log_guardrail_rejection(total, cap, supply);
        tracing::warn!(
            percent_bps = request.percent_bps,
            supply_basis = request.supply.label(),
            "Sell request over the price impact cap"
        );
        return Err(TransactionBuilderError::GuardrailViolation {
            requested: total,
            cap,
            cap_bps: MAX_SELL_BPS,
            supply,
        });
    }

    if total == 0 {
        return Err(TransactionBuilderError::validation("nothing to sell, every share rounds to zero"));
    }

    Ok(SellPlan {
        dev_amount,
        wallet_amounts,
        total,
    })
}

/// Packs session actions into bundles
pub struct BundleBuilder<'c> {
    builder: EnvelopeBuilder<'c>,
}

impl<'c> BundleBuilder<'c> {
    pub fn new(ctx: &'c BuildContext) -> Self {
        Self {
            builder: EnvelopeBuilder::new(ctx),
        }
    }

    fn ctx(&self) -> &BuildContext {
        self.builder.context()
    }

    pub fn logger(&self) -> &StructuredLogger {
        self.builder.logger()
    }

    fn tip(&self, payer: &Pubkey) -> Instruction {
        tip_instruction(payer, self.ctx().tip_lamports)
    }

    fn finish(&self, label: &str, envelopes: Vec<TransactionEnvelope>, timer: Timer) -> BuildResult<Bundle> {
        let bundle = Bundle::new(label, envelopes)?;
        timer.observe(|m| &m.build_latency);
        self.logger()
            .log_bundle_assembled(label, bundle.len(), bundle.total_bytes());
        Ok(bundle)
    }

    /// Create + dev buy, then wallet swaps of at most `wallets_per_swap`
    ///
    /// Envelope 1 is paid and signed by the dev with the mint co-signing and
    /// is not compressed. Swap envelopes are paid by the fee payer, which also
    /// funds each wallet's token account, and are compressed.
    pub fn launch(&self, req: &LaunchRequest<'_>) -> BuildResult<Bundle> {
        let timer = Timer::start();
        let mint = req.mint.pubkey();
        let dev = req.dev_buy.wallet.pubkey();
        let per = self.ctx().budget.wallets_per_swap.max(1);
        let chunks: Vec<&[PlannedBuy<'_>]> = req.wallet_buys.chunks(per).collect();

        let mut create_ixs = vec![
            pump::create(&mint, &dev, &req.metadata.name, &req.metadata.symbol, &req.metadata.uri),
            create_token_account(&dev, &dev, &mint),
            pump::buy(
                &mint,
                &dev,
                req.dev_buy.token_amount,
                max_sol_cost(req.dev_buy.sol_input, req.slippage_bps),
            ),
        ];
        if chunks.is_empty() {
            create_ixs.push(self.tip(&dev));
        }

        let mut envelopes = Vec::with_capacity(chunks.len() + 1);
        envelopes.push(self.builder.build(
            &EnvelopeRequest {
                label: DEV_BUY_LABEL,
                chunk_index: 0,
                fee_payer: dev,
                instructions: &create_ixs,
                compress: false,
            },
            &SignerPool::new().with(req.dev_buy.wallet).with(req.mint),
        )?);

        let payer = req.fee_payer.pubkey();
        for (i, chunk) in chunks.iter().enumerate() {
            let mut ixs = Vec::with_capacity(chunk.len() * 2 + 1);
            let mut signers = SignerPool::new().with(req.fee_payer);
            for buy in chunk.iter() {
                let wallet = buy.wallet.pubkey();
                ixs.push(create_token_account(&payer, &wallet, &mint));
                ixs.push(pump::buy(
                    &mint,
                    &wallet,
                    buy.token_amount,
                    max_sol_cost(buy.sol_input, req.slippage_bps),
                ));
                signers.add(buy.wallet);
            }
            if i + 1 == chunks.len() {
                ixs.push(self.tip(&payer));
            }

            envelopes.push(self.builder.build(
                &EnvelopeRequest {
                    label: WALLET_SWAP_LABEL,
                    chunk_index: i,
                    fee_payer: payer,
                    instructions: &ixs,
                    compress: true,
                },
                &signers,
            )?);
        }

        self.finish(LAUNCH_LABEL, envelopes, timer)
    }

    /// Plain transfers from the fee payer, tip folded into the last chunk
    pub fn distribute(&self, req: &DistributeRequest<'_>) -> BuildResult<Bundle> {
        let timer = Timer::start();
        let payer = req.fee_payer.pubkey();
        if req.transfers.is_empty() {
            return Err(TransactionBuilderError::validation("no transfers to distribute"));
        }
        if let Some((to, _)) = req.transfers.iter().find(|(_, lamports)| *lamports == 0) {
            return Err(TransactionBuilderError::validation(format!("zero lamport transfer to {to}")));
        }

        let mut ixs: Vec<Instruction> = req
            .transfers
            .iter()
            .map(|(to, lamports)| system_instruction::transfer(&payer, to, *lamports))
            .collect();
        ixs.push(self.tip(&payer));

        let per = self.ctx().budget.transfers_per_envelope.max(1);
        let signers = SignerPool::new().with(req.fee_payer);
        let envelopes = ixs
            .chunks(per)
            .enumerate()
            .map(|(i, chunk)| {
                self.builder.build(
                    &EnvelopeRequest {
                        label: DISTRIBUTE_LABEL,
                        chunk_index: i,
                        fee_payer: payer,
                        instructions: chunk,
                        compress: true,
                    },
                    &signers,
                )
            })
            .collect::<BuildResult<Vec<_>>>()?;

        self.finish(DISTRIBUTE_LABEL, envelopes, timer)
    }

    /// Consolidate shares into the fee payer's token account, then sell
    ///
    /// The guardrail runs before any instruction is built.
    pub fn sell(&self, req: &SellRequest<'_>) -> BuildResult<Bundle> {
        let timer = Timer::start();
        let plan = plan_sell(req, self.logger())?;
        let mint = *req.pool.mint();
        let payer = req.fee_payer.pubkey();

        let mut sellers: Vec<(&Keypair, u64)> = Vec::with_capacity(req.wallets.len());
        for (holding, (pubkey, amount)) in req.wallets.iter().zip(&plan.wallet_amounts) {
            if *amount == 0 {
                with_metrics(|m| m.wallets_skipped.inc());
                self.logger().log_wallet_skipped(pubkey, "nothing to sell");
                continue;
            }
            sellers.push((holding.wallet, *amount));
        }

        let per = self.ctx().budget.wallets_per_swap.max(1);
        let mut envelopes = Vec::new();
        let mut chunks: Vec<&[(&Keypair, u64)]> = sellers.chunks(per).collect();
        if chunks.is_empty() {
            // dev share only
            chunks.push(&[]);
        }

        for (i, chunk) in chunks.iter().enumerate() {
            let mut ixs = Vec::with_capacity(chunk.len() + 2);
            let mut signers = SignerPool::new().with(req.fee_payer);
            if i == 0 {
                ixs.push(create_token_account(&payer, &payer, &mint));
                if plan.dev_amount > 0 {
                    ixs.push(token_transfer(&mint, &req.dev.wallet.pubkey(), &payer, plan.dev_amount)?);
                    signers.add(req.dev.wallet);
                }
            }
            for (wallet, amount) in chunk.iter() {
                ixs.push(token_transfer(&mint, &wallet.pubkey(), &payer, *amount)?);
                signers.add(*wallet);
            }

            envelopes.push(self.builder.build(
                &EnvelopeRequest {
                    label: SELL_TRANSFER_LABEL,
                    chunk_index: i,
                    fee_payer: payer,
                    instructions: &ixs,
                    compress: true,
                },
                &signers,
            )?);
        }

        let sell_payer = req.sell_payer.pubkey();
        let sell_ixs = self.sell_instructions(req, plan.total);
        envelopes.push(self.builder.build(
            &EnvelopeRequest {
                label: SELL_LABEL,
                chunk_index: 0,
                fee_payer: sell_payer,
                instructions: &sell_ixs,
                compress: true,
            },
            &SignerPool::new().with(req.sell_payer).with(req.fee_payer),
        )?);

        tracing::info!(
            pool = req.pool.label(),
            total = plan.total,
            percent_bps = req.percent_bps,
            supply_basis = req.supply.label(),
            "Sell bundle planned"
        );
        self.finish(SELL_LABEL, envelopes, timer)
    }

    /// Pool sell of the consolidated amount, then the tip from the fee payer
    fn sell_instructions(&self, req: &SellRequest<'_>, total: u64) -> Vec<Instruction> {
        let payer = req.fee_payer.pubkey();
        let mut ixs = req.pool.sell_instructions(&payer, total, req.min_sol_output);
        ixs.push(self.tip(&payer));
        ixs
    }

    /// Every wallet returns its full lamport balance to the fee payer
    pub fn reclaim(&self, req: &ReclaimRequest<'_>) -> BuildResult<Bundle> {
        let timer = Timer::start();
        let payer = req.fee_payer.pubkey();

        let funded: Vec<(&Keypair, u64)> = req
            .wallets
            .iter()
            .filter(|(wallet, lamports)| {
                if *lamports == 0 {
                    self.logger().log_wallet_skipped(&wallet.pubkey(), "empty balance");
                }
                *lamports > 0
            })
            .copied()
            .collect();
        if funded.is_empty() {
            return Err(TransactionBuilderError::validation("no wallet holds lamports to reclaim"));
        }

        let per = self.ctx().budget.wallets_per_reclaim.max(1);
        let chunks: Vec<&[(&Keypair, u64)]> = funded.chunks(per).collect();
        let mut envelopes = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let mut signers = SignerPool::new().with(req.fee_payer);
            let mut ixs: Vec<Instruction> = chunk
                .iter()
                .map(|(wallet, lamports)| {
                    signers.add(*wallet);
                    system_instruction::transfer(&wallet.pubkey(), &payer, *lamports)
                })
                .collect();
            if i + 1 == chunks.len() {
                ixs.push(self.tip(&payer));
            }

            envelopes.push(self.builder.build(
                &EnvelopeRequest {
                    label: RECLAIM_LABEL,
                    chunk_index: i,
                    fee_payer: payer,
                    instructions: &ixs,
                    compress: true,
                },
                &signers,
            )?);
        }

        self.finish(RECLAIM_LABEL, envelopes, timer)
    }
}
