//! Ledger collaborator
//!
//! The engine only needs a narrow slice of the RPC surface. It is expressed as
//! the [`LedgerClient`] trait so the pipeline can run against
//! [`crate::test_utils::MockLedger`] in tests and [`SolanaLedger`] in production.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash,
    message::AddressLookupTableAccount, pubkey::Pubkey,
};
use tracing::debug;

use super::rpc_errors::{RpcManagerError, RpcResult};

/// Size of the lookup-table metadata header preceding the address list
pub const LOOKUP_TABLE_META_SIZE: usize = 56;

/// Account type tag of an initialized lookup table
const LOOKUP_TABLE_TYPE_TAG: u32 = 1;

/// Narrow read interface over the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch an account, `None` when it does not exist (yet)
    async fn get_account(&self, address: &Pubkey) -> RpcResult<Option<Account>>;

    /// Fetch a recent block reference
    async fn get_latest_blockhash(&self) -> RpcResult<Hash>;

    /// Most recent finalized slot
    async fn get_finalized_slot(&self) -> RpcResult<u64>;

    /// Total supply of a mint in base units
    async fn get_token_supply(&self, mint: &Pubkey) -> RpcResult<u64>;

    /// Balance of a token account in base units
    async fn get_token_balance(&self, token_account: &Pubkey) -> RpcResult<u64>;

    /// Lamport balance of a system account
    async fn get_balance(&self, address: &Pubkey) -> RpcResult<u64>;

    /// Read and decode an address lookup table, `None` when absent
    async fn get_lookup_table(
        &self,
        address: &Pubkey,
    ) -> RpcResult<Option<AddressLookupTableAccount>> {
        match self.get_account(address).await? {
            Some(account) => decode_lookup_table(*address, &account.data).map(Some),
            None => Ok(None),
        }
    }
}

/// Decode the raw data of an address lookup table account
pub fn decode_lookup_table(key: Pubkey, data: &[u8]) -> RpcResult<AddressLookupTableAccount> {
    if data.len() < LOOKUP_TABLE_META_SIZE {
        return Err(RpcManagerError::decode(
            key,
            format!("{} bytes is shorter than the table header", data.len()),
        ));
    }

    let mut tag = [0u8; 4];
    tag.copy_from_slice(&data[..4]);
    if u32::from_le_bytes(tag) != LOOKUP_TABLE_TYPE_TAG {
        return Err(RpcManagerError::decode(key, "not an initialized lookup table"));
    }

    let body = &data[LOOKUP_TABLE_META_SIZE..];
    if body.len() % 32 != 0 {
        return Err(RpcManagerError::decode(
            key,
            format!("address area of {} bytes is not a multiple of 32", body.len()),
        ));
    }

    let addresses = body
        .chunks_exact(32)
        .map(|chunk| {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(chunk);
            Pubkey::new_from_array(bytes)
        })
        .collect();

    Ok(AddressLookupTableAccount { key, addresses })
}

/// [`LedgerClient`] backed by the nonblocking Solana RPC client
pub struct SolanaLedger {
    client: RpcClient,
    endpoint: String,
}

impl SolanaLedger {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: RpcClient::new_with_commitment(endpoint.clone(), CommitmentConfig::confirmed()),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.endpoint)
    }

    fn parse_amount(&self, account: &Pubkey, raw: &str) -> RpcResult<u64> {
        raw.parse::<u64>()
            .map_err(|e| RpcManagerError::decode(account, format!("token amount '{raw}': {e}")))
    }
}

impl std::fmt::Debug for SolanaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaLedger")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl LedgerClient for SolanaLedger {
    async fn get_account(&self, address: &Pubkey) -> RpcResult<Option<Account>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await
            .map_err(|e| self.map_err(e))?;
        debug!(account = %address, found = response.value.is_some(), "get_account");
        Ok(response.value)
    }

    async fn get_latest_blockhash(&self) -> RpcResult<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_finalized_slot(&self) -> RpcResult<u64> {
        self.client
            .get_slot_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_token_supply(&self, mint: &Pubkey) -> RpcResult<u64> {
        let supply = self
            .client
            .get_token_supply(mint)
            .await
            .map_err(|e| self.map_err(e))?;
        self.parse_amount(mint, &supply.amount)
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> RpcResult<u64> {
        let balance = self
            .client
            .get_token_account_balance(token_account)
            .await
            .map_err(|e| self.map_err(e))?;
        self.parse_amount(token_account, &balance.amount)
    }

    async fn get_balance(&self, address: &Pubkey) -> RpcResult<u64> {
        self.client
            .get_balance(address)
            .await
            .map_err(|e| self.map_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_bytes(addresses: &[Pubkey]) -> Vec<u8> {
        let mut data = vec![0u8; LOOKUP_TABLE_META_SIZE];
        data[..4].copy_from_slice(&LOOKUP_TABLE_TYPE_TAG.to_le_bytes());
        for a in addresses {
            data.extend_from_slice(a.as_ref());
        }
        data
    }

    #[test]
    fn test_decode_lookup_table() {
        let key = Pubkey::new_unique();
        let addrs: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let table = decode_lookup_table(key, &table_bytes(&addrs)).unwrap();
        assert_eq!(table.key, key);
        assert_eq!(table.addresses, addrs);
    }

    #[test]
    fn test_decode_empty_table() {
        let table = decode_lookup_table(Pubkey::new_unique(), &table_bytes(&[])).unwrap();
        assert!(table.addresses.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_layouts() {
        let key = Pubkey::new_unique();
        assert!(decode_lookup_table(key, &[0u8; 10]).is_err());

        let mut misaligned = table_bytes(&[Pubkey::new_unique()]);
        misaligned.push(7);
        assert!(decode_lookup_table(key, &misaligned).is_err());

        let mut uninitialized = table_bytes(&[]);
        uninitialized[0] = 0;
        let err = decode_lookup_table(key, &uninitialized).unwrap_err();
        assert!(!err.is_retryable());
    }
}
