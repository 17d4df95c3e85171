//! Instruction schemas
//!
//! Byte-exact account lists and little-endian argument layouts for every
//! on-chain call the engine emits:
//! - address lookup table: create, extend
//! - bonding-curve program: create, buy, sell
//! - SPL token: idempotent token-account creation, transfer
//! - relay tip: a system transfer to one of the relay tip accounts
//!
//! Builders here are pure; they never fetch state.

use rand::seq::SliceRandom;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_instruction, system_program, sysvar,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};

use super::errors::{BuildResult, TransactionBuilderError};

/// Bonding-curve program and its fixed accounts
pub mod pump {
    use super::*;

    pub const PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
    pub const GLOBAL: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
    pub const MINT_AUTHORITY: Pubkey = pubkey!("TSLvdd1pWpHVjahSpsvCXUbgwsL3JAcvokwaKt1eokM");
    pub const EVENT_AUTHORITY: Pubkey = pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1");
    pub const FEE_RECIPIENT: Pubkey = pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
    pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

    pub const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];
    pub const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
    pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

    pub fn bonding_curve(mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &PROGRAM_ID).0
    }

    pub fn associated_bonding_curve(mint: &Pubkey) -> Pubkey {
        get_associated_token_address(&bonding_curve(mint), mint)
    }

    pub fn metadata(mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
            &METADATA_PROGRAM_ID,
        )
        .0
    }

    fn amount_args(discriminator: [u8; 8], a: u64, b: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&discriminator);
        data.extend_from_slice(&a.to_le_bytes());
        data.extend_from_slice(&b.to_le_bytes());
        data
    }

    fn push_string(data: &mut Vec<u8>, value: &str) {
        data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        data.extend_from_slice(value.as_bytes());
    }

    /// `create(name, symbol, uri)`; signers: mint and user
    pub fn create(mint: &Pubkey, user: &Pubkey, name: &str, symbol: &str, uri: &str) -> Instruction {
        let curve = bonding_curve(mint);
        let mut data = Vec::with_capacity(8 + 12 + name.len() + symbol.len() + uri.len());
        data.extend_from_slice(&CREATE_DISCRIMINATOR);
        push_string(&mut data, name);
        push_string(&mut data, symbol);
        push_string(&mut data, uri);

        Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(*mint, true),
                AccountMeta::new_readonly(MINT_AUTHORITY, false),
                AccountMeta::new(curve, false),
                AccountMeta::new(get_associated_token_address(&curve, mint), false),
                AccountMeta::new_readonly(GLOBAL, false),
                AccountMeta::new_readonly(METADATA_PROGRAM_ID, false),
                AccountMeta::new(metadata(mint), false),
                AccountMeta::new(*user, true),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
                AccountMeta::new_readonly(sysvar::rent::id(), false),
                AccountMeta::new_readonly(EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(PROGRAM_ID, false),
            ],
            data,
        }
    }

    /// `buy(amount, max_sol_cost)`; signer: user
    pub fn buy(mint: &Pubkey, user: &Pubkey, amount: u64, max_sol_cost: u64) -> Instruction {
        let curve = bonding_curve(mint);
        Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![
                AccountMeta::new_readonly(GLOBAL, false),
                AccountMeta::new(FEE_RECIPIENT, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(curve, false),
                AccountMeta::new(get_associated_token_address(&curve, mint), false),
                AccountMeta::new(get_associated_token_address(user, mint), false),
                AccountMeta::new(*user, true),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(sysvar::rent::id(), false),
                AccountMeta::new_readonly(EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(PROGRAM_ID, false),
            ],
            data: amount_args(BUY_DISCRIMINATOR, amount, max_sol_cost),
        }
    }

    /// `sell(amount, min_sol_output)`; signer: user
    pub fn sell(mint: &Pubkey, user: &Pubkey, amount: u64, min_sol_output: u64) -> Instruction {
        let curve = bonding_curve(mint);
        Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![
                AccountMeta::new_readonly(GLOBAL, false),
                AccountMeta::new(FEE_RECIPIENT, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(curve, false),
                AccountMeta::new(get_associated_token_address(&curve, mint), false),
                AccountMeta::new(get_associated_token_address(user, mint), false),
                AccountMeta::new(*user, true),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(spl_associated_token_account::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(PROGRAM_ID, false),
            ],
            data: amount_args(SELL_DISCRIMINATOR, amount, min_sol_output),
        }
    }
}

/// Address lookup table program
pub mod lookup_table {
    use super::*;

    pub const PROGRAM_ID: Pubkey = pubkey!("AddressLookupTab1e1111111111111111111111111");

    const CREATE_TAG: u32 = 0;
    const EXTEND_TAG: u32 = 2;

    /// Table address derived from its authority and a recent finalized slot
    pub fn derive_address(authority: &Pubkey, recent_slot: u64) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[authority.as_ref(), &recent_slot.to_le_bytes()], &PROGRAM_ID)
    }

    /// Create-table instruction and the address it creates
    pub fn create(authority: &Pubkey, payer: &Pubkey, recent_slot: u64) -> (Instruction, Pubkey) {
        let (table, bump) = derive_address(authority, recent_slot);

        let mut data = Vec::with_capacity(13);
        data.extend_from_slice(&CREATE_TAG.to_le_bytes());
        data.extend_from_slice(&recent_slot.to_le_bytes());
        data.push(bump);

        let ix = Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(table, false),
                AccountMeta::new_readonly(*authority, false),
                AccountMeta::new(*payer, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
            data,
        };
        (ix, table)
    }

    /// Append `addresses` to `table`
    pub fn extend(table: &Pubkey, authority: &Pubkey, payer: &Pubkey, addresses: &[Pubkey]) -> Instruction {
        let mut data = Vec::with_capacity(12 + addresses.len() * 32);
        data.extend_from_slice(&EXTEND_TAG.to_le_bytes());
        data.extend_from_slice(&(addresses.len() as u64).to_le_bytes());
        for address in addresses {
            data.extend_from_slice(address.as_ref());
        }

        Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(*table, false),
                AccountMeta::new_readonly(*authority, true),
                AccountMeta::new(*payer, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
            data,
        }
    }
}

/// Relay tip accounts
pub const TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

/// Uniform-random tip destination
pub fn random_tip_account() -> Pubkey {
    *TIP_ACCOUNTS
        .choose(&mut rand::thread_rng())
        .unwrap_or(&TIP_ACCOUNTS[0])
}

/// Tip transfer from `payer` to a random relay tip account
pub fn tip_instruction(payer: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(payer, &random_tip_account(), lamports)
}

/// True for a system transfer into one of the relay tip accounts
pub fn is_tip_instruction(ix: &Instruction) -> bool {
    ix.program_id == system_program::id()
        && ix.accounts.len() == 2
        && ix.data.first_chunk::<4>() == Some(&2u32.to_le_bytes())
        && TIP_ACCOUNTS.contains(&ix.accounts[1].pubkey)
}

pub fn count_tips(instructions: &[Instruction]) -> usize {
    instructions.iter().filter(|ix| is_tip_instruction(ix)).count()
}

/// Idempotent token-account creation, rent paid by `funder`
pub fn create_token_account(funder: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    create_associated_token_account_idempotent(funder, owner, mint, &spl_token::id())
}

/// Token transfer between the token accounts of two owners
pub fn token_transfer(mint: &Pubkey, from_owner: &Pubkey, to_owner: &Pubkey, amount: u64) -> BuildResult<Instruction> {
    spl_token::instruction::transfer(
        &spl_token::id(),
        &get_associated_token_address(from_owner, mint),
        &get_associated_token_address(to_owner, mint),
        from_owner,
        &[],
        amount,
    )
    .map_err(|e| TransactionBuilderError::instruction_failed("spl-token", e.to_string()))
}
