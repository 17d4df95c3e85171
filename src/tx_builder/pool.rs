//! Pool key variants
//!
//! Each supported on-chain pool type is one variant with every account it
//! needs resolved at construction. Sell paths match on the variant instead of
//! probing optional fields at use-site.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
};
use spl_associated_token_account::get_associated_token_address;

use super::errors::{BuildResult, TransactionBuilderError};
use super::instructions::{create_token_account, pump};

pub const RAYDIUM_AMM_V4: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const OPENBOOK_PROGRAM: Pubkey = pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");

/// Serialized size of an OpenBook v3 market account
pub const MARKET_STATE_V3_LEN: usize = 388;

const SWAP_BASE_IN_TAG: u8 = 9;

// OpenBook v3 market field offsets
const OFF_VAULT_SIGNER_NONCE: usize = 45;
const OFF_BASE_MINT: usize = 53;
const OFF_QUOTE_MINT: usize = 85;
const OFF_BASE_VAULT: usize = 117;
const OFF_QUOTE_VAULT: usize = 165;
const OFF_EVENT_QUEUE: usize = 253;
const OFF_BIDS: usize = 285;
const OFF_ASKS: usize = 317;

/// Bonding-curve pool of one mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpCurveKeys {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
}

impl PumpCurveKeys {
    pub fn new(mint: Pubkey) -> Self {
        Self {
            mint,
            bonding_curve: pump::bonding_curve(&mint),
            associated_bonding_curve: pump::associated_bonding_curve(&mint),
        }
    }
}

/// Raydium AMM v4 pool bound to an OpenBook market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaydiumAmmKeys {
    pub mint: Pubkey,
    pub amm_id: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub market_id: Pubkey,
    pub market_authority: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn amm_pda(market_id: &Pubkey, seed: &[u8]) -> Pubkey {
    Pubkey::find_program_address(&[RAYDIUM_AMM_V4.as_ref(), market_id.as_ref(), seed], &RAYDIUM_AMM_V4).0
}

impl RaydiumAmmKeys {
    /// Derive the pool from raw market account data
    ///
    /// The market must pair `mint` (base) with wrapped SOL (quote).
    pub fn from_market(market_id: Pubkey, market_data: &[u8], mint: Pubkey) -> BuildResult<Self> {
        let invalid = |reason: String| TransactionBuilderError::instruction_failed("raydium-amm-v4", reason);

        if market_data.len() < MARKET_STATE_V3_LEN {
            return Err(invalid(format!(
                "market {market_id} has {} bytes, expected {MARKET_STATE_V3_LEN}",
                market_data.len()
            )));
        }

        let base_mint = read_pubkey(market_data, OFF_BASE_MINT);
        let quote_mint = read_pubkey(market_data, OFF_QUOTE_MINT);
        if base_mint != mint {
            return Err(invalid(format!("market base mint {base_mint} is not {mint}")));
        }
        if quote_mint != spl_token::native_mint::id() {
            return Err(invalid(format!("market quote mint {quote_mint} is not wrapped SOL")));
        }

        let nonce = read_u64(market_data, OFF_VAULT_SIGNER_NONCE);
        let market_authority =
            Pubkey::create_program_address(&[market_id.as_ref(), &nonce.to_le_bytes()], &OPENBOOK_PROGRAM)
                .map_err(|e| invalid(format!("vault signer for nonce {nonce}: {e}")))?;

        Ok(Self {
            mint,
            amm_id: amm_pda(&market_id, b"amm_associated_seed"),
            authority: Pubkey::find_program_address(&[b"amm authority"], &RAYDIUM_AMM_V4).0,
            open_orders: amm_pda(&market_id, b"open_order_associated_seed"),
            target_orders: amm_pda(&market_id, b"target_associated_seed"),
            base_vault: amm_pda(&market_id, b"coin_vault_associated_seed"),
            quote_vault: amm_pda(&market_id, b"pc_vault_associated_seed"),
            market_id,
            market_authority,
            market_bids: read_pubkey(market_data, OFF_BIDS),
            market_asks: read_pubkey(market_data, OFF_ASKS),
            market_event_queue: read_pubkey(market_data, OFF_EVENT_QUEUE),
            market_base_vault: read_pubkey(market_data, OFF_BASE_VAULT),
            market_quote_vault: read_pubkey(market_data, OFF_QUOTE_VAULT),
        })
    }

    /// Swap-base-in from `source` to `destination`, owned by `owner`
    pub fn swap(&self, source: &Pubkey, destination: &Pubkey, owner: &Pubkey, amount_in: u64, min_out: u64) -> Instruction {
        let mut data = Vec::with_capacity(17);
        data.push(SWAP_BASE_IN_TAG);
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&min_out.to_le_bytes());

        Instruction {
            program_id: RAYDIUM_AMM_V4,
            accounts: vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new(self.amm_id, false),
                AccountMeta::new_readonly(self.authority, false),
                AccountMeta::new(self.open_orders, false),
                AccountMeta::new(self.target_orders, false),
                AccountMeta::new(self.base_vault, false),
                AccountMeta::new(self.quote_vault, false),
                AccountMeta::new_readonly(OPENBOOK_PROGRAM, false),
                AccountMeta::new(self.market_id, false),
                AccountMeta::new(self.market_bids, false),
                AccountMeta::new(self.market_asks, false),
                AccountMeta::new(self.market_event_queue, false),
                AccountMeta::new(self.market_base_vault, false),
                AccountMeta::new(self.market_quote_vault, false),
                AccountMeta::new(*source, false),
                AccountMeta::new(*destination, false),
                AccountMeta::new(*owner, true),
            ],
            data,
        }
    }
}

/// Closed set of supported pool types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolKeys {
    PumpCurve(PumpCurveKeys),
    RaydiumAmmV4(RaydiumAmmKeys),
}

impl PoolKeys {
    pub fn mint(&self) -> &Pubkey {
        match self {
            PoolKeys::PumpCurve(keys) => &keys.mint,
            PoolKeys::RaydiumAmmV4(keys) => &keys.mint,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PoolKeys::PumpCurve(_) => "pump-curve",
            PoolKeys::RaydiumAmmV4(_) => "raydium-amm-v4",
        }
    }

    /// Instructions selling `amount` tokens held by `seller` into the pool
    pub fn sell_instructions(&self, seller: &Pubkey, amount: u64, min_sol_output: u64) -> Vec<Instruction> {
        match self {
            PoolKeys::PumpCurve(keys) => vec![pump::sell(&keys.mint, seller, amount, min_sol_output)],
            PoolKeys::RaydiumAmmV4(keys) => {
                let native = spl_token::native_mint::id();
                let source = get_associated_token_address(seller, &keys.mint);
                let destination = get_associated_token_address(seller, &native);
                vec![
                    create_token_account(seller, seller, &native),
                    keys.swap(&source, &destination, seller, amount, min_sol_output),
                ]
            }
        }
    }
}
