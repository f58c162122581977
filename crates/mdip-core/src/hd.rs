//! Hierarchical deterministic key derivation.
//!
//! A single 12-word BIP-39 phrase seeds a BIP-32 tree over secp256k1.
//! Identity keys live at `m/44'/0'/<account>'/0/<index>`: the hardened
//! account component is fixed per identity, the index increments on every
//! key rotation. Because the seed persists, any historical `(account,
//! index)` key can be re-derived on demand.

use crate::{Error, Keypair, Result};
use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use k256::SecretKey;

/// Generate a fresh 12-word English mnemonic (128 bits of entropy).
pub fn generate_mnemonic() -> Mnemonic {
    let entropy: [u8; 16] = rand::random();
    Mnemonic::from_entropy_in(Language::English, &entropy)
        .expect("16 bytes is valid BIP-39 entropy")
}

/// Parse a phrase back into a mnemonic.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))
}

/// Derive the BIP-32 master key from a mnemonic (empty passphrase).
pub fn hdkey_from_mnemonic(mnemonic: &Mnemonic) -> Result<XPrv> {
    let seed = mnemonic.to_seed("");
    XPrv::new(seed).map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Re-open a master key from its serialized xprv form.
pub fn hdkey_from_xprv(xprv: &str) -> Result<XPrv> {
    xprv.parse::<XPrv>()
        .map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Derive the identity keypair at `m/44'/0'/{account}'/0/{index}`.
pub fn derive_keypair(hdkey: &XPrv, account: u32, index: u32) -> Result<Keypair> {
    let path: DerivationPath = format!("m/44'/0'/{}'/0/{}", account, index)
        .parse()
        .map_err(|e: bip32::Error| Error::KeyDerivation(e.to_string()))?;

    let mut key = hdkey.clone();
    for child in path.as_ref() {
        key = key
            .derive_child(*child)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    }

    Ok(Keypair::from_secret_key(&signing_to_secret(&key)?))
}

/// The keypair of the master key itself.
///
/// Seals wallet-level material: the mnemonic at rest, wallet backups, and
/// identity vault blobs. Nothing derived from another seed can open it.
pub fn root_keypair(hdkey: &XPrv) -> Result<Keypair> {
    Ok(Keypair::from_secret_key(&signing_to_secret(hdkey)?))
}

fn signing_to_secret(key: &XPrv) -> Result<SecretKey> {
    SecretKey::from_bytes(&key.private_key().to_bytes())
        .map_err(|_| Error::KeyDerivation("master key is not a valid scalar".into()))
}
