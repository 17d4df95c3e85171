//! Per-build context
//!
//! Everything an envelope needs that is fetched from the network before any
//! packing starts: the recent block reference and, for trade envelopes, the
//! populated session address table. Building is synchronous once a context
//! exists, so curve-derived amounts cannot drift while envelopes are packed.

use solana_sdk::{message::AddressLookupTableAccount, hash::Hash};

use crate::observability::TraceContext;

use super::size::SizeBudget;

/// Context shared by every envelope of one bundle
///
/// # Lifecycle
///
/// 1. The engine reads the latest blockhash (and the table for trade actions)
/// 2. A context is built once per session action
/// 3. All envelopes of the bundle are compiled against it
/// 4. The context is dropped after submission; a dropped bundle is rebuilt
///    from a fresh context, never resubmitted as is
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Recent block reference baked into every message
    pub blockhash: Hash,

    /// Session address table, when envelopes should be compressed
    pub lookup_table: Option<AddressLookupTableAccount>,

    /// Byte ceiling and chunk limits
    pub budget: SizeBudget,

    /// Relay tip in lamports, attached once per bundle
    pub tip_lamports: u64,

    /// Correlation for logs and relay submission
    pub trace: TraceContext,
}

impl BuildContext {
    pub fn new(blockhash: Hash, tip_lamports: u64) -> Self {
        Self {
            blockhash,
            lookup_table: None,
            budget: SizeBudget::default(),
            tip_lamports,
            trace: TraceContext::new("build"),
        }
    }

    pub fn with_lookup_table(mut self, table: AddressLookupTableAccount) -> Self {
        self.lookup_table = Some(table);
        self
    }

    pub fn with_budget(mut self, budget: SizeBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    /// Tables to compile compressed envelopes against (empty or one)
    pub fn lookup_tables(&self) -> &[AddressLookupTableAccount] {
        self.lookup_table.as_slice()
    }
}
