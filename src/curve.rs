//! Bonding-curve pre-simulation
//!
//! Constant-product model with a virtual SOL offset. All reserve math runs in
//! `u128` so the results match the on-chain integer arithmetic bit for bit.
//! Floats appear only in the display-only `percent_of_supply`.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{debug, warn};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Base units per whole token (6 decimals)
pub const TOKEN_UNIT: u64 = 1_000_000;

/// Total minted supply in base units
pub const TOTAL_SUPPLY: u64 = 1_000_000_000 * TOKEN_UNIT;

/// Virtual SOL added on top of the real SOL reserves
pub const VIRTUAL_SOL_OFFSET: u64 = 30 * LAMPORTS_PER_SOL;

pub const INITIAL_VIRTUAL_TOKEN_RESERVES: u64 = 1_073_000_000 * TOKEN_UNIT;
pub const INITIAL_REAL_TOKEN_RESERVES: u64 = 793_100_000 * TOKEN_UNIT;

/// Operator input errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurveError {
    #[error("'{input}' is not a SOL amount: {reason}")]
    InvalidAmount { input: String, reason: String },
}

/// Reserve state of the curve, all values in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub real_token_reserves: u64,
}

impl Default for CurveState {
    fn default() -> Self {
        Self::initial()
    }
}

impl CurveState {
    /// State of a freshly created curve
    pub fn initial() -> Self {
        Self {
            virtual_sol_reserves: VIRTUAL_SOL_OFFSET,
            virtual_token_reserves: INITIAL_VIRTUAL_TOKEN_RESERVES,
            real_sol_reserves: 0,
            real_token_reserves: INITIAL_REAL_TOKEN_RESERVES,
        }
    }

    /// Constant product `virtual_sol * virtual_token`
    pub fn product(&self) -> u128 {
        self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128
    }

    /// Token output for a buy of `sol_input` lamports against this state
    pub fn quote_buy(&self, sol_input: u64) -> u64 {
        let virtual_sol = self.virtual_sol_reserves as u128;
        let virtual_token = self.virtual_token_reserves as u128;
        let k = virtual_sol * virtual_token;
        let remaining = k / (virtual_sol + sol_input as u128) + 1;
        let out = virtual_token.saturating_sub(remaining);
        // Bounded by real_token_reserves which is a u64
        out.min(self.real_token_reserves as u128) as u64
    }

    /// Apply a buy and return the token output
    pub fn apply_buy(&mut self, sol_input: u64) -> u64 {
        let tokens_out = self.quote_buy(sol_input);
        self.real_sol_reserves = self.real_sol_reserves.saturating_add(sol_input);
        self.virtual_sol_reserves = self.virtual_sol_reserves.saturating_add(sol_input);
        self.real_token_reserves -= tokens_out;
        self.virtual_token_reserves -= tokens_out;
        tokens_out
    }
}

/// One requested buy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationInput {
    pub identity: Pubkey,
    /// Lamports; zero or negative entries are skipped
    pub sol_input: i64,
}

/// Precomputed buy for one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub identity: Pubkey,
    pub sol_input: u64,
    pub token_output: u64,
    pub percent_of_supply: f64,
}

/// Result of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub allocations: Vec<Allocation>,
    pub final_state: CurveState,
    pub skipped: Vec<Pubkey>,
}

impl SimulationReport {
    pub fn total_tokens(&self) -> u64 {
        self.allocations.iter().map(|a| a.token_output).sum()
    }

    pub fn total_percent(&self) -> f64 {
        percent_of_supply(self.total_tokens())
    }
}

/// Deterministic simulator, restartable from its fixed initial state
#[derive(Debug, Clone, Copy)]
pub struct CurveSimulator {
    initial: CurveState,
}

impl Default for CurveSimulator {
    fn default() -> Self {
        Self::new(CurveState::initial())
    }
}

impl CurveSimulator {
    pub fn new(initial: CurveState) -> Self {
        Self { initial }
    }

    /// Run the inputs in order against a fresh copy of the initial state
    pub fn simulate(&self, inputs: &[SimulationInput]) -> SimulationReport {
        let mut state = self.initial;
        let mut allocations = Vec::with_capacity(inputs.len());
        let mut skipped = Vec::new();

        for input in inputs {
            if input.sol_input <= 0 {
                warn!(identity = %input.identity, sol_input = input.sol_input, "Non-positive SOL input, skipping identity");
                skipped.push(input.identity);
                continue;
            }

            let sol_input = input.sol_input as u64;
            let token_output = state.apply_buy(sol_input);
            debug!(
                identity = %input.identity,
                sol_input,
                token_output,
                real_token_reserves = state.real_token_reserves,
                "Simulated buy"
            );

            allocations.push(Allocation {
                identity: input.identity,
                sol_input,
                token_output,
                percent_of_supply: percent_of_supply(token_output),
            });
        }

        SimulationReport {
            allocations,
            final_state: state,
            skipped,
        }
    }
}

pub fn percent_of_supply(tokens: u64) -> f64 {
    tokens as f64 / TOTAL_SUPPLY as f64 * 100.0
}

/// Parse a decimal SOL string ("1", "0.25", "-1") into lamports exactly
pub fn parse_sol_amount(input: &str) -> Result<i64, CurveError> {
    let invalid = |reason: &str| CurveError::InvalidAmount {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("empty"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected digits with an optional decimal point"));
    }
    if fraction.len() > 9 {
        return Err(invalid("more than 9 decimal places"));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("too large"))?
    };
    let fraction_lamports: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse().map_err(|_| invalid("bad fraction"))?
    };

    let lamports = whole
        .checked_mul(LAMPORTS_PER_SOL as i64)
        .and_then(|l| l.checked_add(fraction_lamports))
        .ok_or_else(|| invalid("too large"))?;

    Ok(if negative { -lamports } else { lamports })
}

/// Render lamports as a SOL decimal string without trailing zeros
pub fn format_sol(lamports: u64) -> String {
    let whole = lamports / LAMPORTS_PER_SOL;
    let fraction = lamports % LAMPORTS_PER_SOL;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:09}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Apply a basis-point premium to a lamport amount
pub fn with_premium_bps(lamports: u64, premium_bps: u32) -> u64 {
    let scaled = lamports as u128 * (10_000 + premium_bps as u128) / 10_000;
    scaled.min(u64::MAX as u128) as u64
}
