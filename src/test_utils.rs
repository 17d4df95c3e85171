//! Test Utilities Module
//!
//! In-memory stand-ins for the ledger and relay collaborators so the session
//! pipeline can run deterministically without a network. Integration tests
//! under `tests/` use them through the public API.

use async_trait::async_trait;
use solana_sdk::{
    account::Account, message::AddressLookupTableAccount, hash::Hash, pubkey::Pubkey,
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::observability::TraceContext;
use crate::rpc_manager::{LedgerClient, RpcManagerError, RpcResult};
use crate::tx_builder::{Bundle, BundleOutcome, BundleStatus, Bundler};

const MOCK_ENDPOINT: &str = "mock://ledger";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, Account>,
    balances: HashMap<Pubkey, u64>,
    token_balances: HashMap<Pubkey, u64>,
    /// address -> remaining reads that time out
    failing_reads: HashMap<Pubkey, u32>,
    supplies: HashMap<Pubkey, u64>,
    /// table -> (addresses, read number from which it is visible)
    tables: HashMap<Pubkey, (Vec<Pubkey>, u32)>,
    table_reads: HashMap<Pubkey, u32>,
}

/// Mock ledger with scripted state
///
/// Everything absent reads as "not found" (accounts, tables) or zero
/// (balances), matching a fresh chain.
pub struct MockLedger {
    blockhash: Hash,
    slot: u64,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            slot: 250_000_000,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    pub fn set_account(&self, address: Pubkey, account: Account) {
        lock(&self.state).accounts.insert(address, account);
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        lock(&self.state).balances.insert(address, lamports);
    }

    /// Token balance of `owner`'s associated account for `mint`
    pub fn set_token_balance(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) {
        let ata = get_associated_token_address(owner, mint);
        lock(&self.state).token_balances.insert(ata, amount);
    }

    /// Time out the next `times` balance reads of `owner`'s token account
    pub fn fail_token_balance(&self, owner: &Pubkey, mint: &Pubkey, times: u32) {
        let ata = get_associated_token_address(owner, mint);
        self.fail_balance(ata, times);
    }

    /// Time out the next `times` balance reads of `address`
    pub fn fail_balance(&self, address: Pubkey, times: u32) {
        lock(&self.state).failing_reads.insert(address, times);
    }

    pub fn set_token_supply(&self, mint: Pubkey, amount: u64) {
        lock(&self.state).supplies.insert(mint, amount);
    }

    /// Table visible from the first read
    pub fn set_lookup_table(&self, table: Pubkey, addresses: Vec<Pubkey>) {
        self.set_lookup_table_after(table, addresses, 1);
    }

    /// Table visible from read number `visible_on_read` (1-based)
    pub fn set_lookup_table_after(&self, table: Pubkey, addresses: Vec<Pubkey>, visible_on_read: u32) {
        lock(&self.state).tables.insert(table, (addresses, visible_on_read));
    }

    pub fn lookup_table_reads(&self, table: &Pubkey) -> u32 {
        lock(&self.state).table_reads.get(table).copied().unwrap_or(0)
    }
}

impl LedgerState {
    fn take_failure(&mut self, address: &Pubkey) -> RpcResult<()> {
        match self.failing_reads.get_mut(address) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(RpcManagerError::Timeout {
                    endpoint: MOCK_ENDPOINT.to_string(),
                    timeout_ms: 0,
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_account(&self, address: &Pubkey) -> RpcResult<Option<Account>> {
        Ok(lock(&self.state).accounts.get(address).cloned())
    }

    async fn get_latest_blockhash(&self) -> RpcResult<Hash> {
        Ok(self.blockhash)
    }

    async fn get_finalized_slot(&self) -> RpcResult<u64> {
        Ok(self.slot)
    }

    async fn get_token_supply(&self, mint: &Pubkey) -> RpcResult<u64> {
        lock(&self.state)
            .supplies
            .get(mint)
            .copied()
            .ok_or_else(|| RpcManagerError::AccountNotFound {
                account: mint.to_string(),
                endpoint: MOCK_ENDPOINT.to_string(),
            })
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> RpcResult<u64> {
        let mut state = lock(&self.state);
        state.take_failure(token_account)?;
        Ok(state.token_balances.get(token_account).copied().unwrap_or(0))
    }

    async fn get_balance(&self, address: &Pubkey) -> RpcResult<u64> {
        let mut state = lock(&self.state);
        state.take_failure(address)?;
        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    async fn get_lookup_table(&self, address: &Pubkey) -> RpcResult<Option<AddressLookupTableAccount>> {
        let mut state = lock(&self.state);
        let reads = {
            let reads = state.table_reads.entry(*address).or_insert(0);
            *reads += 1;
            *reads
        };
        Ok(state
            .tables
            .get(address)
            .filter(|(_, visible_on)| reads >= *visible_on)
            .map(|(addresses, _)| AddressLookupTableAccount {
                key: *address,
                addresses: addresses.clone(),
            }))
    }
}

/// Mock relay returning a fixed outcome and recording what it was sent
pub struct MockBundler {
    outcome: BundleOutcome,
    status: Option<BundleStatus>,
    submitted: Mutex<Vec<Bundle>>,
}

impl MockBundler {
    pub fn new(outcome: BundleOutcome) -> Self {
        Self {
            outcome,
            status: Some(BundleStatus::Landed),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Accepts every bundle under a fixed id
    pub fn new_success() -> Self {
        Self::new(BundleOutcome::Accepted("mock-bundle-id".to_string()))
    }

    /// Drops every bundle for lack of a leader
    pub fn new_dropped() -> Self {
        Self::new(BundleOutcome::Dropped(
            crate::tx_builder::bundle::DROPPED_MARKER.to_string(),
        ))
    }

    /// Rejects every bundle with a transport error
    pub fn new_failure() -> Self {
        Self::new(BundleOutcome::TransportError("mock relay unavailable".to_string()))
    }

    pub fn with_status(mut self, status: Option<BundleStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn submission_count(&self) -> usize {
        lock(&self.submitted).len()
    }

    pub fn submitted(&self) -> Vec<Bundle> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl Bundler for MockBundler {
    async fn submit(&self, bundle: &Bundle, _trace: &TraceContext) -> BundleOutcome {
        lock(&self.submitted).push(bundle.clone());
        self.outcome.clone()
    }

    async fn bundle_status(&self, _bundle_id: &str) -> RpcResult<Option<BundleStatus>> {
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_ledger_table_visibility() {
        let ledger = MockLedger::new();
        let table = Pubkey::new_unique();
        ledger.set_lookup_table_after(table, vec![Pubkey::new_unique()], 2);
        assert!(ledger.get_lookup_table(&table).await.unwrap().is_none());
        assert!(ledger.get_lookup_table(&table).await.unwrap().is_some());
        assert_eq!(ledger.lookup_table_reads(&table), 2);
    }

    #[tokio::test]
    async fn test_mock_ledger_token_balances() {
        let ledger = MockLedger::new();
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        ledger.set_token_balance(&owner, &mint, 42);
        let ata = get_associated_token_address(&owner, &mint);
        assert_eq!(ledger.get_token_balance(&ata).await.unwrap(), 42);

        ledger.fail_token_balance(&owner, &mint, 1);
        assert!(ledger.get_token_balance(&ata).await.unwrap_err().is_retryable());
        assert_eq!(ledger.get_token_balance(&ata).await.unwrap(), 42);
        assert!(ledger.get_token_supply(&mint).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_bundler_records_submissions() {
        let bundler = MockBundler::new_dropped();
        assert_eq!(bundler.submission_count(), 0);
        assert_eq!(bundler.bundle_status("x").await.unwrap(), Some(BundleStatus::Landed));
    }
}
