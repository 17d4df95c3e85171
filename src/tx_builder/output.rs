//! Envelope and bundle output types
//!
//! `TransactionEnvelope` is a signed, measured transaction plus the metadata
//! the pipeline logs and checks. `Bundle` is an ordered list of envelopes that
//! the relay executes all-or-nothing.
//!
//! ## Invariants
//! - every envelope was measured at or under the packet ceiling before signing
//! - every required signer has signed; an envelope is not modified afterwards
//! - a bundle is non-empty and carries exactly one relay tip, in its last envelope

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use super::errors::{BuildResult, TransactionBuilderError};

/// One signed, size-bounded transaction
#[derive(Debug, Clone)]
pub struct TransactionEnvelope {
    /// Logical label (e.g. "extend-table", "wallet-swap")
    pub label: String,

    /// Index of this envelope within its action's chunks
    pub chunk_index: usize,

    /// The signed transaction
    pub tx: VersionedTransaction,

    /// Serialized size measured before signing
    pub size: usize,

    /// Relay tip instructions contained
    pub tip_count: usize,

    /// Signers in signature order, fee payer first
    pub required_signers: Vec<Pubkey>,
}

impl TransactionEnvelope {
    pub fn has_tip(&self) -> bool {
        self.tip_count > 0
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.required_signers.first()
    }

    /// First signature, the transaction id
    pub fn signature(&self) -> Option<&Signature> {
        self.tx.signatures.first()
    }

    /// Base64 of the wire encoding, as the relay expects it
    pub fn encode_base64(&self) -> BuildResult<String> {
        let bytes = bincode::serialize(&self.tx)
            .map_err(|e| TransactionBuilderError::internal(format!("failed to serialize '{}': {e}", self.label)))?;
        Ok(BASE64_STANDARD.encode(bytes))
    }
}

/// Ordered envelopes submitted as one atomic unit
#[derive(Debug, Clone)]
pub struct Bundle {
    label: String,
    envelopes: Vec<TransactionEnvelope>,
}

impl Bundle {
    /// Assemble a bundle, enforcing the single trailing tip
    pub fn new(label: impl Into<String>, envelopes: Vec<TransactionEnvelope>) -> BuildResult<Self> {
        let label = label.into();
        let Some(last) = envelopes.last() else {
            return Err(TransactionBuilderError::internal(format!("bundle '{label}' has no envelopes")));
        };

        let tips: usize = envelopes.iter().map(|e| e.tip_count).sum();
        if tips != 1 || last.tip_count != 1 {
            return Err(TransactionBuilderError::internal(format!(
                "bundle '{label}' must carry exactly one tip in its last envelope, found {tips} (last has {})",
                last.tip_count
            )));
        }

        Ok(Self { label, envelopes })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn envelopes(&self) -> &[TransactionEnvelope] {
        &self.envelopes
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Always false for a constructed bundle
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.envelopes.iter().map(|e| e.size).sum()
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.envelopes.iter().filter_map(|e| e.signature().copied()).collect()
    }

    /// Base64 transactions in execution order
    pub fn encoded_transactions(&self) -> BuildResult<Vec<String>> {
        self.envelopes.iter().map(TransactionEnvelope::encode_base64).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        message::{v0, VersionedMessage},
    };

    fn envelope(label: &str, tip_count: usize) -> TransactionEnvelope {
        let payer = Pubkey::new_unique();
        let msg = v0::Message::try_compile(&payer, &[], &[], Hash::default()).unwrap();
        TransactionEnvelope {
            label: label.to_string(),
            chunk_index: 0,
            tx: VersionedTransaction {
                signatures: vec![Signature::default()],
                message: VersionedMessage::V0(msg),
            },
            size: 100,
            tip_count,
            required_signers: vec![payer],
        }
    }

    #[test]
    fn test_bundle_requires_trailing_tip() {
        assert!(Bundle::new("ok", vec![envelope("a", 0), envelope("b", 1)]).is_ok());
        assert!(Bundle::new("lead", vec![envelope("a", 1), envelope("b", 0)]).is_err());
        assert!(Bundle::new("double", vec![envelope("a", 1), envelope("b", 1)]).is_err());
        assert!(Bundle::new("none", vec![envelope("a", 0)]).is_err());
        assert!(Bundle::new("empty", vec![]).is_err());
    }

    #[test]
    fn test_bundle_totals_and_encoding() {
        let bundle = Bundle::new("x", vec![envelope("a", 0), envelope("b", 1)]).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.total_bytes(), 200);
        let encoded = bundle.encoded_transactions().unwrap();
        assert_eq!(encoded.len(), 2);
        let decoded = BASE64_STANDARD.decode(&encoded[0]).unwrap();
        let tx: VersionedTransaction = bincode::deserialize(&decoded).unwrap();
        assert_eq!(tx.message.static_account_keys(), bundle.envelopes()[0].required_signers.as_slice());
    }
}
