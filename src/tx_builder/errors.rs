//! Error types for the Transaction Builder supercomponent
//!
//! One taxonomy covers the whole bundle lifecycle, from operator input through
//! packing and signing to relay submission. Errors are designed to be:
//! - Informative: every variant carries the context an operator needs to act
//!   (measured size, chunk index, computed sell volume vs. cap)
//! - Classifiable: `is_retryable()` and `category()` drive metrics and callers
//! - Composable: RPC and session errors convert in with `?`

use thiserror::Error;

use crate::rpc_manager::RpcManagerError;
use crate::session::SessionError;

/// Comprehensive error type for all bundle building operations
///
/// Propagation rules:
/// - `Validation` and `GuardrailViolation` stop before any network mutation
/// - `SizeLimitExceeded` and `ResourceUnavailable` stop before submission
/// - only `SubmissionDropped` and `Transport` can surface after state may have changed
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// Bad operator input (amounts, percentages, key material)
    ///
    /// Recovered locally by the caller, typically by asking again.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A compiled envelope is larger than the ledger packet limit
    ///
    /// Fatal to the build attempt; the bundle must not be submitted.
    #[error(
        "Envelope '{label}' (chunk {chunk_index}) is {size} bytes, exceeds the {limit} byte limit"
    )]
    SizeLimitExceeded {
        /// Logical envelope label (e.g. "wallet-swap")
        label: String,
        /// Index of the chunk within its action
        chunk_index: usize,
        /// Measured serialized size
        size: usize,
        /// Hard ceiling
        limit: usize,
    },

    /// An account the build depends on is not visible after bounded polling
    #[error("{resource} unavailable after {attempts} attempts: {hint}")]
    ResourceUnavailable {
        /// What was being waited for
        resource: String,
        /// How many reads were attempted
        attempts: u32,
        /// Remediation hint for the operator
        hint: String,
    },

    /// Requested sell volume breaches the per-bundle price impact cap
    #[error("Sell of {requested} base units reaches the cap of {cap} ({cap_bps} bps of supply {supply})")]
    GuardrailViolation {
        /// Aggregated requested volume
        requested: u64,
        /// Exclusive cap derived from supply
        cap: u64,
        /// Cap expressed in basis points of supply
        cap_bps: u16,
        /// Supply figure the cap was evaluated against
        supply: u64,
    },

    /// The relay could not reach an eligible block producer in time
    ///
    /// Retryable by the caller with a fresh block reference.
    #[error("Bundle dropped: {0}")]
    SubmissionDropped(String),

    /// Any other relay or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild {
        /// The program the instruction targets
        program: String,
        /// Detailed reason for the failure
        reason: String,
    },

    /// Failed to sign an envelope (missing or unexpected signer)
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Failed to fetch a recent block reference
    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Ledger collaborator failure
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Session file could not be read or written
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    ///
    /// Only a dropped submission and transient ledger reads qualify; everything
    /// else requires a changed request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SubmissionDropped(_) => true,
            Self::Blockhash(_) => true,
            Self::Rpc(e) => e.is_retryable(),

            Self::Validation(_) => false,
            Self::SizeLimitExceeded { .. } => false,
            Self::ResourceUnavailable { .. } => false,
            Self::GuardrailViolation { .. } => false,
            Self::Transport(_) => false,
            Self::InstructionBuild { .. } => false,
            Self::Signing(_) => false,
            Self::Session(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::SizeLimitExceeded { .. } => "size",
            Self::ResourceUnavailable { .. } => "resource",
            Self::GuardrailViolation { .. } => "guardrail",
            Self::SubmissionDropped(_) => "dropped",
            Self::Transport(_) => "transport",
            Self::InstructionBuild { .. } => "instruction",
            Self::Signing(_) => "signing",
            Self::Blockhash(_) => "blockhash",
            Self::Rpc(_) => "rpc",
            Self::Session(_) => "session",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn table_unavailable(table: impl std::fmt::Display, attempts: u32) -> Self {
        Self::ResourceUnavailable {
            resource: format!("address table {}", table),
            attempts,
            hint: "the table may still be propagating; wait a few slots and rerun, \
                   or recreate it if the creation bundle was dropped"
                .to_string(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

/// Result alias used across the builder
pub type BuildResult<T> = std::result::Result<T, TransactionBuilderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::SizeLimitExceeded {
            label: "wallet-swap".to_string(),
            chunk_index: 2,
            size: 1301,
            limit: 1232,
        };
        assert_eq!(
            err.to_string(),
            "Envelope 'wallet-swap' (chunk 2) is 1301 bytes, exceeds the 1232 byte limit"
        );

        let err = TransactionBuilderError::GuardrailViolation {
            requested: 260,
            cap: 250,
            cap_bps: 2500,
            supply: 1000,
        };
        assert!(err.to_string().contains("260"));
        assert!(err.to_string().contains("250"));
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransactionBuilderError::SubmissionDropped("leader".into()).is_retryable());
        assert!(TransactionBuilderError::Blockhash("stale".into()).is_retryable());

        assert!(!TransactionBuilderError::Transport("503".into()).is_retryable());
        assert!(!TransactionBuilderError::validation("nan").is_retryable());
        assert!(!TransactionBuilderError::table_unavailable("x", 20).is_retryable());
        assert!(!TransactionBuilderError::GuardrailViolation {
            requested: 1,
            cap: 0,
            cap_bps: 2500,
            supply: 0
        }
        .is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransactionBuilderError::validation("x").category(), "validation");
        assert_eq!(
            TransactionBuilderError::table_unavailable("x", 1).category(),
            "resource"
        );
        assert_eq!(TransactionBuilderError::Transport("x".into()).category(), "transport");
        assert_eq!(TransactionBuilderError::internal("x").category(), "internal");
    }

    #[test]
    fn test_table_unavailable_carries_hint() {
        let err = TransactionBuilderError::table_unavailable("Tab1e", 20);
        let msg = err.to_string();
        assert!(msg.contains("address table Tab1e"));
        assert!(msg.contains("20 attempts"));
        assert!(msg.contains("rerun"));
    }
}
