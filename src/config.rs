//! Configuration module for the launch bundler
//!
//! Loaded from a TOML file, with a `.env` file and selected environment
//! variables applied on top. Every field has a default so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::curve::LAMPORTS_PER_SOL;
use crate::rpc_manager::RetryPolicy;
use crate::tx_builder::{SizeBudget, PACKET_DATA_SIZE};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub wallets: WalletsConfig,

    #[serde(default)]
    pub bundle: BundleConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Attempts for transient ledger reads
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_block_engine_url")]
    pub block_engine_url: String,

    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,

    /// Tip paid once per bundle
    #[serde(default = "default_tip_lamports")]
    pub tip_lamports: u64,

    /// Poll the relay for landing after acceptance
    #[serde(default)]
    pub await_landing: bool,

    #[serde(default = "default_status_poll_attempts")]
    pub status_poll_attempts: u32,

    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletsConfig {
    /// Directory of wallet keypair files
    #[serde(default = "default_keypair_dir")]
    pub keypair_dir: PathBuf,

    #[serde(default = "default_dev_keypair")]
    pub dev_keypair: PathBuf,

    #[serde(default = "default_fee_payer_keypair")]
    pub fee_payer_keypair: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Max SOL cost slippage for buys (basis points)
    #[serde(default = "default_buy_slippage_bps")]
    pub buy_slippage_bps: u16,

    /// Premium applied to the dev entry of a simulation (basis points)
    #[serde(default = "default_dev_premium_bps")]
    pub dev_premium_bps: u16,

    /// Premium added to distributed amounts (basis points)
    #[serde(default = "default_distribute_premium_bps")]
    pub distribute_premium_bps: u16,

    /// Flat lamports added to every distributed amount
    #[serde(default = "default_distribute_flat_lamports")]
    pub distribute_flat_lamports: u64,

    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,

    #[serde(default = "default_wallets_per_swap")]
    pub wallets_per_swap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Read-back attempts after creation or extension
    #[serde(default = "default_table_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_table_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_file")]
    pub file: PathBuf,
}

// Default value functions
fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_rpc_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_block_engine_url() -> String {
    "https://mainnet.block-engine.jito.wtf".to_string()
}
fn default_relay_timeout() -> u64 {
    10
}
fn default_tip_lamports() -> u64 {
    LAMPORTS_PER_SOL / 100
}
fn default_status_poll_attempts() -> u32 {
    30
}
fn default_status_poll_interval_ms() -> u64 {
    1_000
}
fn default_keypair_dir() -> PathBuf {
    PathBuf::from("keypairs")
}
fn default_dev_keypair() -> PathBuf {
    PathBuf::from("dev.json")
}
fn default_fee_payer_keypair() -> PathBuf {
    PathBuf::from("payer.json")
}
fn default_buy_slippage_bps() -> u16 {
    500
}
fn default_dev_premium_bps() -> u16 {
    2_100
}
fn default_distribute_premium_bps() -> u16 {
    150
}
fn default_distribute_flat_lamports() -> u64 {
    2_500_000
}
fn default_max_envelope_bytes() -> usize {
    PACKET_DATA_SIZE
}
fn default_wallets_per_swap() -> usize {
    crate::tx_builder::size::MAX_WALLETS_PER_SWAP
}
fn default_table_poll_attempts() -> u32 {
    RetryPolicy::table_poll().max_attempts
}
fn default_table_poll_interval_ms() -> u64 {
    RetryPolicy::table_poll().backoff.as_millis() as u64
}
fn default_session_file() -> PathBuf {
    PathBuf::from("keyInfo.json")
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            block_engine_url: default_block_engine_url(),
            timeout_secs: default_relay_timeout(),
            tip_lamports: default_tip_lamports(),
            await_landing: false,
            status_poll_attempts: default_status_poll_attempts(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
        }
    }
}

impl Default for WalletsConfig {
    fn default() -> Self {
        Self {
            keypair_dir: default_keypair_dir(),
            dev_keypair: default_dev_keypair(),
            fee_payer_keypair: default_fee_payer_keypair(),
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            buy_slippage_bps: default_buy_slippage_bps(),
            dev_premium_bps: default_dev_premium_bps(),
            distribute_premium_bps: default_distribute_premium_bps(),
            distribute_flat_lamports: default_distribute_flat_lamports(),
            max_envelope_bytes: default_max_envelope_bytes(),
            wallets_per_swap: default_wallets_per_swap(),
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            poll_attempts: default_table_poll_attempts(),
            poll_interval_ms: default_table_poll_interval_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `.env`, then the file (defaults when absent), then env overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `RPC_URL` and `BLOCK_ENGINE_URL`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("RPC_URL").filter(|v| !v.trim().is_empty()) {
            self.rpc.url = url;
        }
        if let Some(url) = lookup("BLOCK_ENGINE_URL").filter(|v| !v.trim().is_empty()) {
            self.relay.block_engine_url = url;
        }
    }

    /// Reject impossible settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.rpc.url.trim().is_empty() {
            return invalid("rpc.url must not be empty");
        }
        if self.relay.block_engine_url.trim().is_empty() {
            return invalid("relay.block_engine_url must not be empty");
        }
        if self.relay.tip_lamports == 0 {
            return invalid("relay.tip_lamports must be positive");
        }
        if self.table.poll_attempts == 0 {
            return invalid("table.poll_attempts must be positive");
        }
        if self.bundle.buy_slippage_bps > 10_000 {
            return invalid("bundle.buy_slippage_bps must not exceed 10000");
        }
        if self.bundle.max_envelope_bytes == 0 || self.bundle.max_envelope_bytes > PACKET_DATA_SIZE {
            return invalid("bundle.max_envelope_bytes must be within 1..=1232");
        }
        if self.bundle.wallets_per_swap == 0 {
            return invalid("bundle.wallets_per_swap must be positive");
        }
        Ok(())
    }

    pub fn size_budget(&self) -> SizeBudget {
        SizeBudget {
            max_envelope_bytes: self.bundle.max_envelope_bytes,
            wallets_per_swap: self.bundle.wallets_per_swap,
            ..SizeBudget::default()
        }
    }

    pub fn rpc_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.rpc.max_retries, Duration::from_millis(self.rpc.retry_backoff_ms))
    }

    pub fn table_poll_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.table.poll_attempts, Duration::from_millis(self.table.poll_interval_ms))
    }

    pub fn status_poll_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.relay.status_poll_attempts,
            Duration::from_millis(self.relay.status_poll_interval_ms),
        )
    }
}
