//! Envelope compilation, measurement and signing
//!
//! Every envelope goes through the same pipeline:
//!
//! 1. compile a v0 message (compressed against the session table when asked)
//! 2. measure the unsigned transaction and fail fast over the ceiling
//! 3. sign with every required signer, fee payer first
//!
//! Measuring happens before signing so an oversized envelope never touches a
//! key.

use std::collections::HashMap;

use solana_sdk::{
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};

use crate::compat;
use crate::metrics::with_metrics;
use crate::structured_logging::StructuredLogger;

use super::context::BuildContext;
use super::errors::{BuildResult, TransactionBuilderError};
use super::instructions::count_tips;
use super::output::TransactionEnvelope;
use super::size::serialized_size;

/// Keypairs available to sign one bundle, looked up by public key
#[derive(Default)]
pub struct SignerPool<'a> {
    signers: HashMap<Pubkey, &'a Keypair>,
}

impl<'a> SignerPool<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keypair: &'a Keypair) -> Self {
        self.add(keypair);
        self
    }

    pub fn add(&mut self, keypair: &'a Keypair) {
        self.signers.insert(keypair.pubkey(), keypair);
    }

    pub fn extend<I: IntoIterator<Item = &'a Keypair>>(&mut self, keypairs: I) {
        for kp in keypairs {
            self.add(kp);
        }
    }

    pub fn get(&self, pubkey: &Pubkey) -> Option<&'a Keypair> {
        self.signers.get(pubkey).copied()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

impl std::fmt::Debug for SignerPool<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerPool")
            .field("pubkeys", &self.signers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Description of one envelope to build
#[derive(Debug, Clone)]
pub struct EnvelopeRequest<'i> {
    pub label: &'i str,
    pub chunk_index: usize,
    pub fee_payer: Pubkey,
    pub instructions: &'i [Instruction],
    /// Compile against the context's address table
    pub compress: bool,
}

/// Compiles, measures and signs envelopes against one `BuildContext`
pub struct EnvelopeBuilder<'c> {
    ctx: &'c BuildContext,
    logger: StructuredLogger,
}

impl<'c> EnvelopeBuilder<'c> {
    pub fn new(ctx: &'c BuildContext) -> Self {
        Self {
            ctx,
            logger: StructuredLogger::for_trace(&ctx.trace),
        }
    }

    pub fn context(&self) -> &BuildContext {
        self.ctx
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Compile and measure without signing
    ///
    /// Returns the unsigned transaction (default signatures) and its wire size.
    pub fn compile(&self, req: &EnvelopeRequest<'_>) -> BuildResult<(VersionedTransaction, usize)> {
        let tables = if req.compress {
            let tables = self.ctx.lookup_tables();
            if tables.is_empty() {
                return Err(TransactionBuilderError::validation(format!(
                    "envelope '{}' needs the session address table, none loaded",
                    req.label
                )));
            }
            tables
        } else {
            &[]
        };

        let message = v0::Message::try_compile(&req.fee_payer, req.instructions, tables, self.ctx.blockhash)
            .map_err(|e| {
                TransactionBuilderError::internal(format!(
                    "failed to compile '{}' chunk {}: {e}",
                    req.label, req.chunk_index
                ))
            })?;
        let message = VersionedMessage::V0(message);
        let num_signers = compat::message_header(&message).num_required_signatures as usize;

        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); num_signers],
            message,
        };
        let size = serialized_size(&tx)?;
        Ok((tx, size))
    }

    /// Full pipeline: compile, measure, check, sign
    pub fn build(&self, req: &EnvelopeRequest<'_>, signers: &SignerPool<'_>) -> BuildResult<TransactionEnvelope> {
        let (mut tx, size) = self.compile(req)?;

        if let Err(e) = self.ctx.budget.check(req.label, req.chunk_index, size) {
            with_metrics(|m| m.size_rejections.inc());
            tracing::error!(
                context_id = %self.logger.context_id(),
                label = %req.label,
                chunk_index = req.chunk_index,
                size_bytes = size,
                limit = self.ctx.budget.max_envelope_bytes,
                "Envelope over size limit, not signing"
            );
            return Err(e);
        }

        let required_signers = compat::required_signers(&tx.message).to_vec();
        let data = tx.message.serialize();
        for (i, key) in required_signers.iter().enumerate() {
            let keypair = signers.get(key).ok_or_else(|| {
                TransactionBuilderError::Signing(format!(
                    "'{}' chunk {} requires a signature from {key} which is not loaded",
                    req.label, req.chunk_index
                ))
            })?;
            tx.signatures[i] = keypair.sign_message(&data);
        }

        let tip_count = count_tips(req.instructions);
        with_metrics(|m| {
            m.envelopes_built.inc();
            m.envelope_size.observe(size as f64);
        });
        self.logger
            .log_envelope_built(req.label, req.chunk_index, size, required_signers.len(), tip_count > 0);

        Ok(TransactionEnvelope {
            label: req.label.to_string(),
            chunk_index: req.chunk_index,
            tx,
            size,
            tip_count,
            required_signers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::instructions::tip_instruction;
    use solana_sdk::{
        message::AddressLookupTableAccount, hash::Hash, system_instruction,
    };

    fn ctx() -> BuildContext {
        BuildContext::new(Hash::new_unique(), 1_000)
    }

    #[test]
    fn test_build_signs_all_required_signers() {
        let payer = Keypair::new();
        let wallet = Keypair::new();
        let ixs = vec![
            system_instruction::transfer(&wallet.pubkey(), &payer.pubkey(), 5),
            tip_instruction(&payer.pubkey(), 1_000),
        ];
        let ctx = ctx();
        let builder = EnvelopeBuilder::new(&ctx);
        let pool = SignerPool::new().with(&payer).with(&wallet);
        let env = builder
            .build(
                &EnvelopeRequest {
                    label: "reclaim",
                    chunk_index: 0,
                    fee_payer: payer.pubkey(),
                    instructions: &ixs,
                    compress: false,
                },
                &pool,
            )
            .unwrap();

        assert_eq!(env.required_signers, vec![payer.pubkey(), wallet.pubkey()]);
        assert!(env.has_tip());
        assert!(env.size <= 1232);
        let data = env.tx.message.serialize();
        for (sig, key) in env.tx.signatures.iter().zip(&env.required_signers) {
            assert!(sig.verify(key.as_ref(), &data));
        }
        assert_eq!(bincode::serialized_size(&env.tx).unwrap() as usize, env.size);
    }

    #[test]
    fn test_missing_signer_is_signing_error() {
        let payer = Keypair::new();
        let wallet = Pubkey::new_unique();
        let ixs = vec![system_instruction::transfer(&wallet, &payer.pubkey(), 5)];
        let ctx = ctx();
        let builder = EnvelopeBuilder::new(&ctx);
        let err = builder
            .build(
                &EnvelopeRequest {
                    label: "reclaim",
                    chunk_index: 2,
                    fee_payer: payer.pubkey(),
                    instructions: &ixs,
                    compress: false,
                },
                &SignerPool::new().with(&payer),
            )
            .unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Signing(_)));
    }

    #[test]
    fn test_oversized_envelope_rejected_before_signing() {
        let payer = Keypair::new();
        // 60 transfers to distinct recipients cannot fit 1232 bytes
        let ixs: Vec<_> = (0..60)
            .map(|_| system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1))
            .collect();
        let ctx = ctx();
        let builder = EnvelopeBuilder::new(&ctx);
        let err = builder
            .build(
                &EnvelopeRequest {
                    label: "distribute",
                    chunk_index: 1,
                    fee_payer: payer.pubkey(),
                    instructions: &ixs,
                    compress: false,
                },
                &SignerPool::new(),
            )
            .unwrap_err();
        match err {
            TransactionBuilderError::SizeLimitExceeded { chunk_index, size, limit, .. } => {
                assert_eq!(chunk_index, 1);
                assert!(size > limit);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_compression_requires_table() {
        let payer = Keypair::new();
        let ixs = vec![tip_instruction(&payer.pubkey(), 1)];
        let ctx = ctx();
        let builder = EnvelopeBuilder::new(&ctx);
        let req = EnvelopeRequest {
            label: "wallet-swap",
            chunk_index: 0,
            fee_payer: payer.pubkey(),
            instructions: &ixs,
            compress: true,
        };
        assert!(matches!(builder.compile(&req), Err(TransactionBuilderError::Validation(_))));
    }

    #[test]
    fn test_compression_shrinks_envelope() {
        let payer = Keypair::new();
        let recipients: Vec<Pubkey> = (0..20).map(|_| Pubkey::new_unique()).collect();
        let ixs: Vec<_> = recipients
            .iter()
            .map(|r| system_instruction::transfer(&payer.pubkey(), r, 1))
            .collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: recipients.clone(),
        };
        let ctx = ctx().with_lookup_table(table);
        let builder = EnvelopeBuilder::new(&ctx);
        let mut req = EnvelopeRequest {
            label: "distribute",
            chunk_index: 0,
            fee_payer: payer.pubkey(),
            instructions: &ixs,
            compress: false,
        };
        let (_, plain) = builder.compile(&req).unwrap();
        req.compress = true;
        let (tx, compressed) = builder.compile(&req).unwrap();
        assert!(compressed < plain);
        assert!(compat::is_compressed(&tx.message));
    }
}
