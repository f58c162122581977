//! Wallet model and persistent store.
//!
//! The wallet is the single persistent blob: the encrypted seed, the
//! account counter, the current-identity selection, and every identity's
//! derivation state. The mnemonic is kept encrypted to the master keypair
//! so the backup flow can round-trip it; the serialized extended key is
//! what day-to-day derivation reopens.

use crate::{Error, Result};
use bip32::{Prefix, XPrv};
use bip39::Mnemonic;
use mdip_core::{cipher, hd, Keypair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// BIP-32 serialization of the master key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdKey {
    pub xpriv: String,
    pub xpub: String,
}

/// Seed material: the mnemonic (encrypted at rest) and the extended key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// The mnemonic phrase, sealed to the master keypair.
    pub mnemonic: String,
    pub hdkey: HdKey,
}

/// Derivation and ownership state for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// The identity's DID.
    pub did: String,
    /// Hardened account component of the derivation path. Immutable.
    pub account: u32,
    /// Current key index; incremented on every rotation.
    pub index: u32,
    /// DIDs this identity has authored (credentials, challenges, envelopes).
    #[serde(default)]
    pub owned: Vec<String>,
    /// Attestation DIDs this identity holds as subject.
    #[serde(default)]
    pub held: Vec<String>,
}

/// The process-wide persistent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub seed: Seed,
    /// Next account to allocate. Every identity's account is below this.
    pub counter: u32,
    /// Name of the active identity, or empty.
    #[serde(default)]
    pub current: String,
    /// Identities by unique name.
    #[serde(default)]
    pub ids: BTreeMap<String, Identity>,
    /// Human-readable aliases for arbitrary DIDs.
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

impl Wallet {
    /// Build a fresh wallet from a mnemonic.
    pub fn new(mnemonic: &Mnemonic) -> Result<Self> {
        let hdkey = hd::hdkey_from_mnemonic(mnemonic)?;
        let root = hd::root_keypair(&hdkey)?;
        let sealed = cipher::encrypt_message(
            &root.public_jwk,
            &root.private_jwk,
            &mnemonic.to_string(),
        )?;

        Ok(Self {
            seed: Seed {
                mnemonic: sealed,
                hdkey: HdKey {
                    xpriv: hdkey.to_extended_key(Prefix::XPRV).to_string(),
                    xpub: hdkey.public_key().to_extended_key(Prefix::XPUB).to_string(),
                },
            },
            counter: 0,
            current: String::new(),
            ids: BTreeMap::new(),
            names: BTreeMap::new(),
        })
    }

    /// Reopen the master key.
    pub fn hdkey(&self) -> Result<XPrv> {
        Ok(hd::hdkey_from_xprv(&self.seed.hdkey.xpriv)?)
    }

    /// The master keypair sealing wallet-level material.
    pub fn root_keypair(&self) -> Result<Keypair> {
        Ok(hd::root_keypair(&self.hdkey()?)?)
    }

    /// Decrypt the stored mnemonic back to its phrase.
    pub fn decrypt_mnemonic(&self) -> Result<String> {
        let root = self.root_keypair()?;
        Ok(cipher::decrypt_message(
            &root.public_jwk,
            &root.private_jwk,
            &self.seed.mnemonic,
        )?)
    }

    /// Derive an identity's keypair at a specific index.
    pub fn keypair_at(&self, account: u32, index: u32) -> Result<Keypair> {
        Ok(hd::derive_keypair(&self.hdkey()?, account, index)?)
    }

    /// The current identity, by name.
    pub fn current_id(&self) -> Result<(&str, &Identity)> {
        if self.current.is_empty() {
            return Err(Error::NoCurrentId);
        }
        let id = self.ids.get(&self.current).ok_or(Error::NoCurrentId)?;
        Ok((self.current.as_str(), id))
    }

    /// True when a name collides with an identity or an alias.
    pub fn name_taken(&self, name: &str) -> bool {
        self.ids.contains_key(name) || self.names.contains_key(name)
    }
}

/// Path-scoped persistence for the wallet blob.
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the wallet, initializing a fresh one on first use.
    pub fn load(&self) -> Result<Wallet> {
        if !self.path.exists() {
            let wallet = Wallet::new(&hd::generate_mnemonic())?;
            self.save(&wallet)?;
            return Ok(wallet);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the wallet atomically: temp file in the same directory, then
    /// rename over the target.
    pub fn save(&self, wallet: &Wallet) -> Result<()> {
        let contents = serde_json::to_string_pretty(wallet)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
