//! Size budget for envelopes
//!
//! Pure layer: the packet ceiling every compiled envelope is measured against,
//! and the per-chunk cardinality limits used when splitting work across
//! envelopes. Nothing here touches the network or holds state.

use solana_sdk::transaction::VersionedTransaction;

use super::errors::{BuildResult, TransactionBuilderError};

/// Maximum serialized transaction size (1280 MTU - 40 IPv6 header - 8 fragment header)
pub const PACKET_DATA_SIZE: usize = 1232;

/// Addresses appended by one extend-table instruction
pub const MAX_ADDRESSES_PER_EXTEND: usize = 30;

/// Wallets whose swap (or token transfer) instructions share one envelope
pub const MAX_WALLETS_PER_SWAP: usize = 6;

/// Plain lamport transfers per envelope
pub const MAX_TRANSFERS_PER_ENVELOPE: usize = 45;

/// Wallets returning their balance in one envelope
pub const MAX_WALLETS_PER_RECLAIM: usize = 7;

/// Byte ceiling plus chunk cardinalities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    pub max_envelope_bytes: usize,
    pub addresses_per_extend: usize,
    pub wallets_per_swap: usize,
    pub transfers_per_envelope: usize,
    pub wallets_per_reclaim: usize,
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self {
            max_envelope_bytes: PACKET_DATA_SIZE,
            addresses_per_extend: MAX_ADDRESSES_PER_EXTEND,
            wallets_per_swap: MAX_WALLETS_PER_SWAP,
            transfers_per_envelope: MAX_TRANSFERS_PER_ENVELOPE,
            wallets_per_reclaim: MAX_WALLETS_PER_RECLAIM,
        }
    }
}

impl SizeBudget {
    /// Fail fast when a measured envelope is over the ceiling
    pub fn check(&self, label: &str, chunk_index: usize, size: usize) -> BuildResult<()> {
        if size > self.max_envelope_bytes {
            return Err(TransactionBuilderError::SizeLimitExceeded {
                label: label.to_string(),
                chunk_index,
                size,
                limit: self.max_envelope_bytes,
            });
        }
        Ok(())
    }
}

/// Wire size of a transaction, signatures included
///
/// Unsigned transactions carry default signatures of the same width, so the
/// measurement before signing equals the size after signing.
pub fn serialized_size(tx: &VersionedTransaction) -> BuildResult<usize> {
    bincode::serialized_size(tx)
        .map(|s| s as usize)
        .map_err(|e| TransactionBuilderError::internal(format!("failed to measure envelope: {e}")))
}
