//! Structured logging of pipeline events
//!
//! Every event carries the action's correlation id so one `grep` pulls out a
//! whole bundle lifecycle.

use solana_sdk::pubkey::Pubkey;

use crate::observability::TraceContext;

/// Structured logger for pipeline events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }

    pub fn for_trace(trace: &TraceContext) -> Self {
        Self::new(trace.correlation_id().as_str())
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_envelope_built(&self, label: &str, chunk_index: usize, size: usize, signers: usize, has_tip: bool) {
        tracing::debug!(
            context_id = %self.context_id,
            label = %label,
            chunk_index,
            size_bytes = size,
            signers,
            has_tip,
            "Envelope built"
        );
    }

    pub fn log_bundle_assembled(&self, label: &str, envelopes: usize, total_bytes: usize) {
        tracing::info!(
            context_id = %self.context_id,
            label = %label,
            envelopes,
            total_bytes,
            "Bundle assembled"
        );
    }

    pub fn log_bundle_submitted(&self, label: &str, bundle_id: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            label = %label,
            bundle_id = %bundle_id,
            latency_ms,
            "Bundle accepted by relay"
        );
    }

    pub fn log_bundle_dropped(&self, label: &str, reason: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            label = %label,
            reason = %reason,
            "Bundle dropped, rebuild with a fresh blockhash to retry"
        );
    }

    pub fn log_bundle_transport_error(&self, label: &str, detail: &str) {
        tracing::error!(
            context_id = %self.context_id,
            label = %label,
            detail = %detail,
            "Bundle submission failed"
        );
    }

    pub fn log_guardrail_rejection(&self, requested: u64, cap: u64, supply: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            requested,
            cap,
            supply,
            "Sell volume reaches the price impact cap, nothing submitted"
        );
    }

    pub fn log_wallet_skipped(&self, wallet: &Pubkey, reason: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            wallet = %wallet,
            reason = %reason,
            "Wallet skipped"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(context_id = %self.context_id, message = %message, "Warning");
    }
}
