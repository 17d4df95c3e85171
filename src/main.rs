//! Launch Bundler CLI
//!
//! One subcommand per session action. Every action reads the session file,
//! builds its bundle against fresh ledger state and submits it to the block
//! engine; the session file is only written after the relay accepts.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launch_bundler::config::Config;
use launch_bundler::curve::{format_sol, parse_sol_amount};
use launch_bundler::metrics::metrics;
use launch_bundler::rpc_manager::SolanaLedger;
use launch_bundler::session::SessionStore;
use launch_bundler::tx_builder::JitoBundler;
use launch_bundler::types::{SupplySource, TokenMetadata};
use launch_bundler::wallet::{KeypairStore, SessionIdentities};
use launch_bundler::{PoolChoice, SellOptions, SessionEngine};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "launch-bundler.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the metrics registry in text format on exit
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate wallet keypairs in the keypair directory
    GenWallets {
        #[arg(long, default_value_t = 24)]
        count: usize,
    },
    #[command(flatten)]
    Action(Action),
}

/// Actions that sign with the session identities
#[derive(Subcommand, Debug)]
enum Action {
    /// Create the session address table
    CreateLut,
    /// Fill the address table and fix the mint identity
    ExtendLut {
        /// Import the mint from a base58 secret instead of generating one
        #[arg(long, env = "MINT_SECRET", hide_env_values = true)]
        mint_secret: Option<String>,
    },
    /// Simulate the buys and record allocations
    Simulate {
        /// Dev buy in SOL (the configured premium is added)
        #[arg(long)]
        dev_sol: String,
        /// Buy per wallet in SOL: one value for all wallets, or one per wallet
        #[arg(long, value_delimiter = ',', required = true)]
        wallet_sol: Vec<String>,
        /// Print the allocations without recording them
        #[arg(long)]
        dry_run: bool,
    },
    /// Fund dev and wallets for their recorded buys
    Distribute,
    /// Create the token and run every recorded buy
    Launch(LaunchArgs),
    /// Sell a share of every holding
    Sell(SellArgs),
    /// Return wallet lamports to the fee payer
    Reclaim,
}

#[derive(ClapArgs, Debug)]
struct LaunchArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    symbol: String,
    /// Metadata URI
    #[arg(long)]
    uri: String,
}

#[derive(ClapArgs, Debug)]
struct SellArgs {
    /// Percentage of each holding to sell, up to two decimals
    #[arg(long)]
    percent: String,
    /// Supply figure the price impact cap is evaluated against
    #[arg(long, default_value = "live")]
    supply: SupplySource,
    /// Sell into the Raydium AMM bound to this OpenBook market
    #[arg(long)]
    raydium_market: Option<Pubkey>,
    /// Wallet index paying the sell envelope (random when omitted)
    #[arg(long)]
    sell_payer: Option<usize>,
    /// Minimum SOL received
    #[arg(long, default_value = "0")]
    min_sol_output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let result = run(args.command, config).await;

    if args.metrics {
        if let Some(m) = metrics() {
            println!("{}", m.render());
        }
    }
    result
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::GenWallets { count } => gen_wallets(&config, count),
        Command::Action(action) => run_action(action, config).await,
    }
}

fn gen_wallets(config: &Config, count: usize) -> Result<()> {
    let store = KeypairStore::new(&config.wallets.keypair_dir);
    let generated = store.generate(count).context("Failed to generate wallets")?;
    info!(count = generated.len(), dir = %store.dir().display(), "Wallets generated");
    for pubkey in generated {
        println!("{pubkey}");
    }
    Ok(())
}

async fn run_action(action: Action, config: Config) -> Result<()> {
    let ids = SessionIdentities::load(
        &config.wallets.dev_keypair,
        &config.wallets.fee_payer_keypair,
        &KeypairStore::new(&config.wallets.keypair_dir),
    )
    .context("Failed to load session identities")?;
    info!(
        dev = %ids.dev.pubkey(),
        fee_payer = %ids.fee_payer.pubkey(),
        wallets = ids.wallets.len(),
        "Identities loaded"
    );

    let bundler = JitoBundler::new(
        &config.relay.block_engine_url,
        Duration::from_secs(config.relay.timeout_secs),
    )
    .context("Failed to create relay client")?;
    let ledger = SolanaLedger::new(&config.rpc.url);
    let store = SessionStore::new(&config.session.file);
    let engine = SessionEngine::new(ledger, bundler, store, config);

    match action {
        Action::CreateLut => {
            let created = engine.create_table(&ids).await.context("Table creation failed")?;
            println!("table {} (bundle {})", created.table, created.bundle_id);
        }
        Action::ExtendLut { mint_secret } => {
            let extended = engine
                .extend_table(&ids, mint_secret.as_deref())
                .await
                .context("Table extension failed")?;
            match extended.bundle_id {
                Some(id) => println!("table {} extended (bundle {id}), mint {}", extended.table, extended.mint),
                None => println!("table {} already complete, mint {}", extended.table, extended.mint),
            }
        }
        Action::Simulate {
            dev_sol,
            wallet_sol,
            dry_run,
        } => {
            let dev = parse_sol_amount(&dev_sol).context("Invalid --dev-sol")?;
            let wallets = wallet_sol
                .iter()
                .map(|s| parse_sol_amount(s))
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid --wallet-sol")?;
            let report = if dry_run {
                engine.preview_simulation(&ids, dev, &wallets)
            } else {
                engine.simulate(&ids, dev, &wallets)
            }
            .context("Simulation failed")?;
            for a in &report.allocations {
                println!(
                    "{}  {:>14} SOL  {:>20} tokens  {:>7.3}%",
                    a.identity,
                    format_sol(a.sol_input),
                    a.token_output,
                    a.percent_of_supply
                );
            }
            println!("total {:.3}% of supply", report.total_percent());
            if dry_run {
                println!("dry run, session not updated");
            }
        }
        Action::Distribute => {
            let id = engine.distribute(&ids).await.context("Distribution failed")?;
            println!("distributed (bundle {id})");
        }
        Action::Launch(args) => {
            let metadata = TokenMetadata {
                name: args.name,
                symbol: args.symbol,
                uri: args.uri,
            };
            let id = engine.launch(&ids, metadata).await.context("Launch failed")?;
            println!("launched (bundle {id})");
        }
        Action::Sell(args) => {
            let min_sol_output = parse_sol_amount(&args.min_sol_output).context("Invalid --min-sol-output")?;
            let options = SellOptions {
                percent_bps: parse_percent_bps(&args.percent)?,
                supply_source: args.supply,
                pool: args
                    .raydium_market
                    .map_or(PoolChoice::Curve, |market| PoolChoice::Raydium { market }),
                sell_payer: args.sell_payer,
                min_sol_output: u64::try_from(min_sol_output).context("--min-sol-output must not be negative")?,
            };
            let id = engine.sell(&ids, &options).await.context("Sell failed")?;
            println!("sold (bundle {id})");
        }
        Action::Reclaim => {
            let id = engine.reclaim(&ids).await.context("Reclaim failed")?;
            println!("reclaimed (bundle {id})");
        }
    }
    Ok(())
}

/// Percentage with at most two decimals, as basis points
fn parse_percent_bps(input: &str) -> Result<u16> {
    let trimmed = input.trim().trim_end_matches('%');
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() || fraction.len() > 2 || !(whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())) {
        bail!("invalid percentage '{input}'");
    }
    let whole: u32 = whole.parse().with_context(|| format!("invalid percentage '{input}'"))?;
    let fraction: u32 = format!("{fraction:0<2}").parse().unwrap_or(0);
    let bps = whole.saturating_mul(100).saturating_add(fraction);
    u16::try_from(bps)
        .ok()
        .filter(|bps| *bps <= 10_000)
        .with_context(|| format!("percentage '{input}' is over 100"))
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "launch_bundler=debug,info"
    } else {
        "launch_bundler=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| env_filter.into());

    #[cfg(feature = "json-logs")]
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_target(true))
        .try_init()?;

    #[cfg(not(feature = "json-logs"))]
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}
