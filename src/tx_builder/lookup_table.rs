//! Address table lifecycle
//!
//! A session's compressed address table is created in one bundle, extended
//! in a second, then read back before any trade envelope references it.
//!
//! - creation derives the table address from the authority and a recent
//!   finalized slot
//! - extension only appends addresses the table does not already hold, in
//!   input order, `addresses_per_extend` per envelope
//! - extend envelopes are never compressed; a table cannot shorten
//!   references to itself while it is being filled
//! - the tip rides on the final extend envelope; when it would push that
//!   envelope over the ceiling the final chunk is split in two

use itertools::Itertools;
use solana_sdk::{
    message::AddressLookupTableAccount, pubkey::Pubkey, signature::Keypair, signer::Signer,
    system_program, sysvar,
};
use spl_associated_token_account::get_associated_token_address;

use crate::metrics::with_metrics;
use crate::rpc_manager::{poll_until, LedgerClient, RetryPolicy};

use super::builder::{EnvelopeBuilder, EnvelopeRequest, SignerPool};
use super::context::BuildContext;
use super::errors::{BuildResult, TransactionBuilderError};
use super::instructions::{lookup_table, pump, tip_instruction};
use super::output::{Bundle, TransactionEnvelope};

pub const CREATE_TABLE_LABEL: &str = "create-table";
pub const EXTEND_TABLE_LABEL: &str = "extend-table";

/// Identities whose accounts populate the session table
#[derive(Debug, Clone)]
pub struct SessionAccounts<'a> {
    pub mint: Pubkey,
    pub wallets: &'a [Pubkey],
    pub dev: Pubkey,
    pub fee_payer: Pubkey,
    pub table: Pubkey,
}

/// Every address the session's envelopes reference, first occurrence kept
///
/// Order: shared program and curve accounts, each wallet followed by its
/// token account, then dev and fee payer accounts, the table itself and the
/// native mint.
pub fn collect_session_addresses(accounts: &SessionAccounts<'_>) -> Vec<Pubkey> {
    let mint = &accounts.mint;
    let fixed = [
        spl_associated_token_account::id(),
        spl_token::id(),
        pump::METADATA_PROGRAM_ID,
        pump::MINT_AUTHORITY,
        pump::GLOBAL,
        pump::PROGRAM_ID,
        pump::metadata(mint),
        pump::associated_bonding_curve(mint),
        pump::bonding_curve(mint),
        pump::EVENT_AUTHORITY,
        system_program::id(),
        sysvar::rent::id(),
        *mint,
        pump::FEE_RECIPIENT,
    ];

    let wallets = accounts
        .wallets
        .iter()
        .flat_map(|w| [*w, get_associated_token_address(w, mint)]);

    let tail = [
        accounts.dev,
        accounts.fee_payer,
        get_associated_token_address(&accounts.dev, mint),
        get_associated_token_address(&accounts.fee_payer, mint),
        accounts.table,
        spl_token::native_mint::id(),
    ];

    fixed.into_iter().chain(wallets).chain(tail).unique().collect()
}

/// Addresses from `wanted` the table does not hold yet, input order kept
pub fn missing_addresses(existing: &[Pubkey], wanted: &[Pubkey]) -> Vec<Pubkey> {
    wanted
        .iter()
        .filter(|a| !existing.contains(a))
        .unique()
        .copied()
        .collect()
}

/// Creation, extension and read-back of the session address table
pub struct AddressTableLifecycle<'c> {
    builder: EnvelopeBuilder<'c>,
}

impl<'c> AddressTableLifecycle<'c> {
    pub fn new(ctx: &'c BuildContext) -> Self {
        Self {
            builder: EnvelopeBuilder::new(ctx),
        }
    }

    /// One-envelope bundle creating the table, plus the table address
    ///
    /// `authority` owns the table and pays for it.
    pub fn create(&self, authority: &Keypair, recent_slot: u64) -> BuildResult<(Bundle, Pubkey)> {
        let payer = authority.pubkey();
        let (create_ix, table) = lookup_table::create(&payer, &payer, recent_slot);
        let ixs = [create_ix, tip_instruction(&payer, self.builder.context().tip_lamports)];

        let envelope = self.builder.build(
            &EnvelopeRequest {
                label: CREATE_TABLE_LABEL,
                chunk_index: 0,
                fee_payer: payer,
                instructions: &ixs,
                compress: false,
            },
            &SignerPool::new().with(authority),
        )?;

        tracing::info!(table = %table, recent_slot, "Address table creation built");
        Ok((Bundle::new(CREATE_TABLE_LABEL, vec![envelope])?, table))
    }

    /// Bundle appending the addresses `table` lacks, `None` when complete
    ///
    /// `current` is the table as last read back; pass `None` for a table
    /// created in this session that has not been read yet.
    pub fn extend(
        &self,
        table: &Pubkey,
        authority: &Keypair,
        addresses: &[Pubkey],
        current: Option<&AddressLookupTableAccount>,
    ) -> BuildResult<Option<Bundle>> {
        let existing = current.map(|t| t.addresses.as_slice()).unwrap_or_default();
        let missing = missing_addresses(existing, addresses);
        if missing.is_empty() {
            tracing::info!(table = %table, held = existing.len(), "Address table already holds every address");
            return Ok(None);
        }

        let per = self.builder.context().budget.addresses_per_extend;
        if per == 0 {
            return Err(TransactionBuilderError::internal("addresses_per_extend must be positive"));
        }

        let chunks: Vec<&[Pubkey]> = missing.chunks(per).collect();
        let mut envelopes = Vec::with_capacity(chunks.len() + 1);
        let (last, leading) = chunks
            .split_last()
            .ok_or_else(|| TransactionBuilderError::internal("no extend chunks"))?;

        for chunk in leading {
            let index = envelopes.len();
            envelopes.push(self.extend_envelope(table, authority, chunk, index, false)?);
        }

        let index = envelopes.len();
        match self.extend_envelope(table, authority, last, index, true) {
            Ok(envelope) => envelopes.push(envelope),
            Err(TransactionBuilderError::SizeLimitExceeded { size, .. }) if last.len() > 1 => {
                let (head, tail) = last.split_at(last.len() / 2);
                tracing::debug!(
                    table = %table,
                    chunk_index = index,
                    size_bytes = size,
                    "Tip overflows the final extend chunk, splitting it"
                );
                envelopes.push(self.extend_envelope(table, authority, head, index, false)?);
                envelopes.push(self.extend_envelope(table, authority, tail, index + 1, true)?);
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            table = %table,
            new_addresses = missing.len(),
            envelopes = envelopes.len(),
            "Address table extension built"
        );
        Ok(Some(Bundle::new(EXTEND_TABLE_LABEL, envelopes)?))
    }

    fn extend_envelope(
        &self,
        table: &Pubkey,
        authority: &Keypair,
        chunk: &[Pubkey],
        chunk_index: usize,
        with_tip: bool,
    ) -> BuildResult<TransactionEnvelope> {
        let payer = authority.pubkey();
        let mut ixs = vec![lookup_table::extend(table, &payer, &payer, chunk)];
        if with_tip {
            ixs.push(tip_instruction(&payer, self.builder.context().tip_lamports));
        }

        self.builder.build(
            &EnvelopeRequest {
                label: EXTEND_TABLE_LABEL,
                chunk_index,
                fee_payer: payer,
                instructions: &ixs,
                compress: false,
            },
            &SignerPool::new().with(authority),
        )
    }
}

/// Poll until `table` is visible and holds every `expected` address
///
/// Exhausting the policy is a terminal `ResourceUnavailable`; dependent
/// envelopes must not be built without a successful read-back.
pub async fn wait_for_table<L>(
    ledger: &L,
    table: &Pubkey,
    expected: &[Pubkey],
    policy: &RetryPolicy,
) -> BuildResult<AddressLookupTableAccount>
where
    L: LedgerClient + ?Sized,
{
    let found = poll_until("address_table_read_back", policy, |attempt| async move {
        with_metrics(|m| m.table_poll_attempts.inc());
        tracing::debug!(table = %table, attempt, max_attempts = policy.max_attempts, "Polling address table");
        let account = ledger.get_lookup_table(table).await?;
        Ok(account.filter(|t| expected.iter().all(|a| t.addresses.contains(a))))
    })
    .await?;

    found.ok_or_else(|| TransactionBuilderError::table_unavailable(table, policy.max_attempts))
}
