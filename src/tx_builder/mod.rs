//! Transaction Builder Supercomponent
//!
//! Packs session actions into size-bounded, multi-signer envelopes and hands
//! them to the relay as atomic bundles.
//!
//! ## Architecture
//!
//! The supercomponent is split into focused modules:
//! - **errors**: Error taxonomy shared by the whole bundle lifecycle
//! - **size**: Packet ceiling and per-chunk cardinality limits
//! - **instructions**: Byte-exact program instructions, relay tip, token helpers
//! - **pool**: Closed set of pool variants the sell path can target
//! - **context**: Blockhash, address table and budget for one build
//! - **output**: Signed envelopes and the bundle invariants
//! - **builder**: Compile, measure and sign a single envelope
//! - **actions**: Launch, distribute, sell and reclaim bundles
//! - **lookup_table**: Address table creation, extension and read-back
//! - **bundle**: Relay submission and outcome classification
//!
//! ## Key Properties
//!
//! ### Size Safety
//! - Every envelope is measured after compilation and before signing
//! - An envelope over 1232 bytes fails the build; nothing is submitted
//!
//! ### Atomicity
//! - Exactly one relay tip per bundle, on its last envelope
//! - Envelope order is execution order
//! - Submission is never retried automatically
//!
//! ### Observability
//! - Envelope sizes and build latency recorded in the metrics registry
//! - Correlation ids carried from build to relay submission
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use launch_bundler::tx_builder::{BuildContext, BundleBuilder, ReclaimRequest};
//! use solana_sdk::{hash::Hash, signature::Keypair};
//!
//! # fn example(payer: &Keypair, wallets: &[Keypair]) -> Result<(), launch_bundler::tx_builder::TransactionBuilderError> {
//! let ctx = BuildContext::new(Hash::default(), 10_000_000);
//! let bundle = BundleBuilder::new(&ctx).reclaim(&ReclaimRequest {
//!     fee_payer: payer,
//!     wallets: wallets.iter().map(|w| (w, 1_000_000)).collect(),
//! })?;
//! assert!(bundle.envelopes().last().is_some_and(|e| e.has_tip()));
//! # Ok(())
//! # }
//! ```

// Public API - Error types
pub mod errors;
pub use errors::{BuildResult, TransactionBuilderError};

pub mod actions;
pub mod builder;
pub mod bundle;
pub mod context;
pub mod instructions;
pub mod lookup_table;
pub mod output;
pub mod pool;
pub mod size;

pub use actions::{
    max_sol_cost, plan_sell, resolve_buys, BundleBuilder, DistributeRequest, Holding, LaunchRequest, PlannedBuy,
    ReclaimRequest, SellPlan, SellRequest, MAX_SELL_BPS,
};
pub use builder::{EnvelopeBuilder, EnvelopeRequest, SignerPool};
pub use bundle::{
    await_landing, classify_relay_error, submit_bundle, BundleOutcome, BundleStatus, Bundler, JitoBundler,
};
pub use context::BuildContext;
pub use lookup_table::{
    collect_session_addresses, missing_addresses, wait_for_table, AddressTableLifecycle, SessionAccounts,
};
pub use output::{Bundle, TransactionEnvelope};
pub use pool::{PoolKeys, PumpCurveKeys, RaydiumAmmKeys};
pub use size::{SizeBudget, PACKET_DATA_SIZE};
