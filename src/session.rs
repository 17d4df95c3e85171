//! Session persistence
//!
//! One JSON document per trading session (`keyInfo.json` by default) carries
//! the address table, the mint identity and one allocation record per wallet.
//! [`SessionStore`] is the only reader/writer; callers hold a [`SessionFile`]
//! value and never share it mutably across components.
//!
//! Unknown keys are kept verbatim so older and newer documents round-trip.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::curve::{format_sol, parse_sol_amount, Allocation, SimulationReport};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to access session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Session is missing '{0}'")]
    Missing(&'static str),
}

impl SessionError {
    fn invalid(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        SessionError::InvalidField {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

/// Per-wallet allocation as persisted
///
/// Amounts stay strings so large integers survive any JSON tooling untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    /// SOL as a decimal string
    pub sol_amount: String,
    /// Token base units as a decimal string
    pub token_amount: String,
    pub percent_supply: f64,
}

impl AllocationRecord {
    pub fn from_allocation(allocation: &Allocation) -> Self {
        Self {
            sol_amount: format_sol(allocation.sol_input),
            token_amount: allocation.token_output.to_string(),
            percent_supply: allocation.percent_of_supply,
        }
    }

    pub fn sol_lamports(&self) -> Result<u64, SessionError> {
        let lamports =
            parse_sol_amount(&self.sol_amount).map_err(|e| SessionError::invalid("solAmount", e))?;
        u64::try_from(lamports).map_err(|_| SessionError::invalid("solAmount", "negative amount"))
    }

    pub fn token_units(&self) -> Result<u64, SessionError> {
        self.token_amount
            .parse()
            .map_err(|e| SessionError::invalid("tokenAmount", e))
    }
}

/// In-memory view of the session document
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(rename = "addressLUT", default, skip_serializing_if = "Option::is_none")]
    pub address_lut: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,

    /// base58 secret of the mint identity
    #[serde(rename = "mintPk", default, skip_serializing_if = "Option::is_none")]
    pub mint_pk: Option<String>,

    /// Allocation records keyed by wallet pubkey, plus any unknown keys
    #[serde(flatten)]
    pub entries: BTreeMap<String, Value>,
}

impl fmt::Debug for SessionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFile")
            .field("address_lut", &self.address_lut)
            .field("mint", &self.mint)
            .field("mint_pk", &self.mint_pk.as_ref().map(|_| "<redacted>"))
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn parse_pubkey(field: &str, raw: &str) -> Result<Pubkey, SessionError> {
    raw.parse().map_err(|e| SessionError::invalid(field, e))
}

impl SessionFile {
    pub fn address_lut(&self) -> Result<Option<Pubkey>, SessionError> {
        self.address_lut
            .as_deref()
            .map(|raw| parse_pubkey("addressLUT", raw))
            .transpose()
    }

    pub fn require_address_lut(&self) -> Result<Pubkey, SessionError> {
        self.address_lut()?.ok_or(SessionError::Missing("addressLUT"))
    }

    pub fn set_address_lut(&mut self, table: Pubkey) {
        self.address_lut = Some(table.to_string());
    }

    pub fn mint(&self) -> Result<Option<Pubkey>, SessionError> {
        self.mint.as_deref().map(|raw| parse_pubkey("mint", raw)).transpose()
    }

    /// Decode the mint identity, checking it against the recorded `mint`
    pub fn mint_keypair(&self) -> Result<Option<Keypair>, SessionError> {
        let Some(encoded) = self.mint_pk.as_deref() else {
            return Ok(None);
        };
        let bytes = Zeroizing::new(
            bs58::decode(encoded)
                .into_vec()
                .map_err(|e| SessionError::invalid("mintPk", e))?,
        );
        let keypair = Keypair::try_from(bytes.as_slice())
            .map_err(|_| SessionError::invalid("mintPk", "not a 64-byte keypair"))?;

        if let Some(mint) = self.mint()? {
            if mint != keypair.pubkey() {
                return Err(SessionError::invalid("mintPk", "does not match 'mint'"));
            }
        }
        Ok(Some(keypair))
    }

    pub fn require_mint_keypair(&self) -> Result<Keypair, SessionError> {
        self.mint_keypair()?.ok_or(SessionError::Missing("mintPk"))
    }

    pub fn set_mint(&mut self, mint: &Keypair) {
        let secret = Zeroizing::new(mint.to_bytes());
        self.mint = Some(mint.pubkey().to_string());
        self.mint_pk = Some(bs58::encode(&secret[..]).into_string());
    }

    pub fn allocation(&self, identity: &Pubkey) -> Result<Option<AllocationRecord>, SessionError> {
        let key = identity.to_string();
        match self.entries.get(&key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| SessionError::invalid(key, e)),
            None => Ok(None),
        }
    }

    pub fn set_allocation(&mut self, allocation: &Allocation) -> Result<(), SessionError> {
        let record = AllocationRecord::from_allocation(allocation);
        let value = serde_json::to_value(&record)
            .map_err(|e| SessionError::invalid(allocation.identity.to_string(), e))?;
        self.entries.insert(allocation.identity.to_string(), value);
        Ok(())
    }

    pub fn remove_allocation(&mut self, identity: &Pubkey) -> bool {
        self.entries.remove(&identity.to_string()).is_some()
    }

    /// Replace the records of every identity in a simulation run
    ///
    /// Identities the run skipped lose any earlier record; keys outside the
    /// run are kept.
    pub fn record_simulation(&mut self, report: &SimulationReport) -> Result<(), SessionError> {
        for identity in &report.skipped {
            if self.remove_allocation(identity) {
                debug!(identity = %identity, "Dropped allocation from an earlier run");
            }
        }
        report.allocations.iter().try_for_each(|a| self.set_allocation(a))
    }
}

/// File-backed store with atomic writes
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Load the document; a missing file is an empty session
    pub fn load(&self) -> Result<SessionFile, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session file yet");
                return Ok(SessionFile::default());
            }
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&raw).map_err(|source| SessionError::Parse {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Write the document to a temp file beside the target and rename it in place
    pub fn save(&self, session: &SessionFile) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(session).map_err(|source| SessionError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_err(e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;

        info!(path = %self.path.display(), entries = session.entries.len(), "Session saved");
        Ok(())
    }

    /// Load, apply `f`, save; nothing is written when `f` fails
    pub fn update<F>(&self, f: F) -> Result<SessionFile, SessionError>
    where
        F: FnOnce(&mut SessionFile) -> Result<(), SessionError>,
    {
        let mut session = self.load()?;
        f(&mut session)?;
        self.save(&session)?;
        Ok(session)
    }
}
