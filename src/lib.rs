//! Launch Bundler Library
//!
//! Packs a token launch session into size-bounded, multi-signer transaction
//! envelopes and submits them to a block-engine relay as atomic bundles.
//! Modules are public so integration tests can drive the pipeline against
//! the in-memory collaborators in [`test_utils`].

pub mod compat;
pub mod config;
pub mod curve;
pub mod engine;
pub mod metrics;
pub mod observability;
pub mod session;
pub mod structured_logging;
pub mod test_utils;
pub mod types;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub mod tx_builder;

// Re-export commonly used types
pub use engine::{PoolChoice, SellOptions, SessionEngine};
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
