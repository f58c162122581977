//! Decentralized Identifier (DID) handling.
//!
//! MDIP DIDs are content-addressed: the suffix is the base58 encoding of
//! the SHA-256 hash of the canonicalized create operation, so the
//! identifier commits to the operation that minted it.
//!
//! Format: `did:mdip:<base58 of content hash>`

use crate::{signing, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The DID method name.
pub const METHOD: &str = "mdip";

/// A parsed did:mdip identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did {
    hash: [u8; 32],
}

impl Did {
    /// Mint the DID for a create operation.
    ///
    /// The operation is canonicalized and hashed as submitted, signature
    /// included, which is the same digest the registry deduplicates on.
    pub fn from_operation(operation: &serde_json::Value) -> Self {
        let digest = signing::hash_json(operation);
        let mut hash = [0u8; 32];
        // hash_json always yields 64 hex chars
        hex::decode_to_slice(digest, &mut hash).expect("sha-256 digest");
        Self { hash }
    }

    /// The content hash committed to by this DID.
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.hash
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", METHOD, bs58::encode(&self.hash).into_string())
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidDid("expected did:mdip:<base58>".into()));
        }
        if parts[0] != "did" {
            return Err(Error::InvalidDid("must start with 'did'".into()));
        }
        if parts[1] != METHOD {
            return Err(Error::InvalidDid(format!(
                "method must be '{}', got '{}'",
                METHOD, parts[1]
            )));
        }

        let bytes = bs58::decode(parts[2])
            .into_vec()
            .map_err(|e| Error::InvalidDid(format!("invalid base58: {}", e)))?;

        if bytes.len() != 32 {
            return Err(Error::InvalidDid(format!(
                "content hash must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Self { hash })
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.to_string()
    }
}
