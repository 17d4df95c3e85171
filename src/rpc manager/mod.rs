//! RPC Manager Module
//!
//! Ledger collaborator interface, its Solana RPC implementation, error
//! classification and the bounded retry policy used for every ledger wait.

// Submodules
pub mod ledger;
pub mod rpc_errors;
pub mod rpc_retry;

// Re-exports for convenience
pub use ledger::{decode_lookup_table, LedgerClient, SolanaLedger, LOOKUP_TABLE_META_SIZE};
pub use rpc_errors::{RpcManagerError, RpcResult};
pub use rpc_retry::{poll_until, retry_with_backoff, RetryPolicy};
