//! Keypair store
//!
//! Loads the session's signing identities from disk. Order is significant:
//! wallets are index-addressed for chunk assignment, so the directory listing
//! is sorted by the numeric suffix of each file name (`keypair2.json` before
//! `keypair10.json`) and is stable across invocations.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid keypair in {path}: {reason}")]
    InvalidKey { path: String, reason: String },

    #[error("No keypairs found in {0}")]
    Empty(PathBuf),
}

fn parse_keypair(origin: &str, bytes: &[u8]) -> Result<Keypair, WalletError> {
    let invalid = |reason: String| WalletError::InvalidKey {
        path: origin.to_string(),
        reason,
    };

    let secret: Zeroizing<Vec<u8>> = if bytes.len() == 64 {
        Zeroizing::new(bytes.to_vec())
    } else {
        Zeroizing::new(serde_json::from_slice(bytes).map_err(|e| invalid(format!("not a JSON byte array: {e}")))?)
    };

    if secret.len() != 64 {
        return Err(invalid(format!("expected 64 bytes, got {}", secret.len())));
    }
    if secret.iter().all(|&b| b == 0) {
        return Err(invalid("all-zero key rejected".to_string()));
    }
    Keypair::try_from(secret.as_slice()).map_err(|e| invalid(e.to_string()))
}

/// One signing identity
///
/// `Debug` shows only the public key.
pub struct Identity {
    keypair: Keypair,
}

impl Identity {
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Raw 64 bytes or a JSON byte array, as written by the Solana CLI
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let bytes = Zeroizing::new(fs::read(path).map_err(|source| WalletError::Io {
            path: path.to_path_buf(),
            source,
        })?);
        parse_keypair(&path.display().to_string(), &bytes).map(Self::from_keypair)
    }

    /// Import a base58-encoded 64-byte secret
    pub fn from_base58(secret: &str) -> Result<Self, WalletError> {
        let bytes = Zeroizing::new(bs58::decode(secret.trim()).into_vec().map_err(|e| WalletError::InvalidKey {
            path: "<base58>".to_string(),
            reason: e.to_string(),
        })?);
        parse_keypair("<base58>", &bytes).map(Self::from_keypair)
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn into_keypair(self) -> Keypair {
        self.keypair
    }

    /// Write as a JSON byte array, readable by `from_file`
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), WalletError> {
        let path = path.as_ref();
        let io = |source: std::io::Error| WalletError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = Zeroizing::new(self.keypair.to_bytes());
        let json = Zeroizing::new(serde_json::to_vec(&bytes[..]).map_err(|e| io(e.into()))?);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io)?;
        std::io::Write::write_all(&mut tmp, &json).map_err(io)?;
        tmp.persist(path).map_err(|e| io(e.error))?;
        Ok(())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// Source of the session's wallet identities
pub trait IdentitySource {
    /// Identities in a stable, index-addressable order
    fn load_identities(&self) -> Result<Vec<Identity>, WalletError>;
}

/// Directory of `*.json` keypair files
#[derive(Debug, Clone)]
pub struct KeypairStore {
    dir: PathBuf,
}

fn numeric_suffix(stem: &str) -> Option<u64> {
    let digits: String = stem
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

impl KeypairStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn keypair_files(&self) -> Result<Vec<PathBuf>, WalletError> {
        let io = |source: std::io::Error| WalletError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }

        files.sort_by_cached_key(|p| {
            let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
            (numeric_suffix(&stem).is_none(), numeric_suffix(&stem), stem)
        });
        Ok(files)
    }

    /// Generate `count` fresh keypairs after the highest existing index
    pub fn generate(&self, count: usize) -> Result<Vec<Pubkey>, WalletError> {
        fs::create_dir_all(&self.dir).map_err(|source| WalletError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let next = self
            .keypair_files()?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).and_then(numeric_suffix))
            .max()
            .map_or(1, |n| n + 1);

        (0..count as u64)
            .map(|i| {
                let identity = Identity::from_keypair(Keypair::new());
                identity.write_to(self.dir.join(format!("keypair{}.json", next + i)))?;
                Ok(identity.pubkey())
            })
            .collect()
    }
}

impl IdentitySource for KeypairStore {
    fn load_identities(&self) -> Result<Vec<Identity>, WalletError> {
        let identities = self
            .keypair_files()?
            .iter()
            .map(Identity::from_file)
            .collect::<Result<Vec<_>, _>>()?;
        if identities.is_empty() {
            return Err(WalletError::Empty(self.dir.clone()));
        }
        tracing::debug!(dir = %self.dir.display(), count = identities.len(), "Loaded wallet identities");
        Ok(identities)
    }
}

/// Every identity a session signs with
#[derive(Debug)]
pub struct SessionIdentities {
    /// Creates the token and makes the seed buy
    pub dev: Identity,
    /// Funds table, swaps, transfers and receives reclaimed balances
    pub fee_payer: Identity,
    /// Independent wallets, index order from the store
    pub wallets: Vec<Identity>,
}

impl SessionIdentities {
    pub fn load(dev: impl AsRef<Path>, fee_payer: impl AsRef<Path>, store: &dyn IdentitySource) -> Result<Self, WalletError> {
        Ok(Self {
            dev: Identity::from_file(dev)?,
            fee_payer: Identity::from_file(fee_payer)?,
            wallets: store.load_identities()?,
        })
    }

    pub fn wallet_pubkeys(&self) -> Vec<Pubkey> {
        self.wallets.iter().map(Identity::pubkey).collect()
    }

    pub fn wallet_keypairs(&self) -> Vec<&Keypair> {
        self.wallets.iter().map(Identity::keypair).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_and_raw_formats() {
        let kp = Keypair::new();
        let json = serde_json::to_vec(&kp.to_bytes().to_vec()).unwrap();
        assert_eq!(parse_keypair("json", &json).unwrap().pubkey(), kp.pubkey());
        assert_eq!(parse_keypair("raw", &kp.to_bytes()).unwrap().pubkey(), kp.pubkey());
    }

    #[test]
    fn test_all_zero_key_rejected() {
        assert!(parse_keypair("zero", &[0u8; 64]).is_err());
        let json = serde_json::to_vec(&vec![0u8; 64]).unwrap();
        assert!(parse_keypair("zero", &json).is_err());
        assert!(parse_keypair("short", b"[1,2,3]").is_err());
    }

    #[test]
    fn test_base58_import() {
        let kp = Keypair::new();
        let encoded = bs58::encode(kp.to_bytes()).into_string();
        assert_eq!(Identity::from_base58(&encoded).unwrap().pubkey(), kp.pubkey());
        assert!(Identity::from_base58("not-base58!").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let identity = Identity::from_keypair(Keypair::new());
        let secret = bs58::encode(identity.keypair().to_bytes()).into_string();
        let debug = format!("{identity:?}");
        assert!(debug.contains(&identity.pubkey().to_string()));
        assert!(!debug.contains(&secret));
    }

    #[test]
    fn test_store_orders_by_numeric_suffix() {
        let dir = TempDir::new().unwrap();
        let store = KeypairStore::new(dir.path());
        let generated = store.generate(12).unwrap();

        let loaded: Vec<Pubkey> = store.load_identities().unwrap().iter().map(Identity::pubkey).collect();
        assert_eq!(loaded, generated);

        // appending continues the numbering
        let more = store.generate(1).unwrap();
        assert!(dir.path().join("keypair13.json").exists());
        assert_eq!(store.load_identities().unwrap().last().unwrap().pubkey(), more[0]);
    }

    #[test]
    fn test_empty_store_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            KeypairStore::new(dir.path()).load_identities(),
            Err(WalletError::Empty(_))
        ));
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(numeric_suffix("keypair10"), Some(10));
        assert_eq!(numeric_suffix("dev"), None);
    }
}
