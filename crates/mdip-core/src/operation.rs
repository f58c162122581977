//! Registry operations: the signed records a DID's history is made of.
//!
//! Every mutation of registry state is an operation: `create` mints a DID,
//! `update` replaces its document, `deactivate` retires it. Operations
//! sign over their canonical form with the signature block detached, and
//! chain through `prev` (the hash of the previous operation) so the
//! registry can enforce a linear history per DID.

use crate::{signing, Did, EcJwk, Error, MdipDocument, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol version carried in every operation.
pub const MDIP_VERSION: u32 = 1;

/// Default registry for newly created DIDs.
pub const DEFAULT_REGISTRY: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Deactivate,
}

/// What kind of entity a create operation mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A keyed identity; the operation carries its public JWK.
    Agent,
    /// A data anchor controlled by an agent; the operation carries a payload.
    Asset,
}

/// Protocol envelope common to all operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdipMeta {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub registry: String,
}

/// Detached signature over an operation's canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSignature {
    /// Signing DID. Absent on create-agent operations, whose key is in the
    /// operation body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// When the signature was made.
    pub signed: DateTime<Utc>,
    /// SHA-256 of the canonical unsigned operation.
    pub hash: String,
    /// Hex ECDSA signature over `hash`.
    pub value: String,
}

/// A registry operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub op: OperationType,
    /// Target DID. Absent on create (the DID is minted from the operation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    pub mdip: MdipMeta,
    /// Public key of a new agent (create-agent only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_jwk: Option<EcJwk>,
    /// Controlling DID of a new asset (create-asset only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Anchored payload (create-asset, or an agent anchoring data).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Replacement document (update only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<MdipDocument>,
    /// Hash of the previous operation for this DID (update/deactivate).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<OpSignature>,
}

impl Operation {
    /// A create operation for a new keyed agent.
    pub fn create_agent(registry: &str, public_jwk: EcJwk) -> Self {
        Self {
            op: OperationType::Create,
            did: None,
            mdip: MdipMeta {
                version: MDIP_VERSION,
                kind: EntityKind::Agent,
                registry: registry.to_string(),
            },
            public_jwk: Some(public_jwk),
            controller: None,
            data: None,
            doc: None,
            prev: None,
            signature: None,
        }
    }

    /// A create operation anchoring a data payload under a controller.
    pub fn create_asset(registry: &str, controller: &str, data: serde_json::Value) -> Self {
        Self {
            op: OperationType::Create,
            did: None,
            mdip: MdipMeta {
                version: MDIP_VERSION,
                kind: EntityKind::Asset,
                registry: registry.to_string(),
            },
            public_jwk: None,
            controller: Some(controller.to_string()),
            data: Some(data),
            doc: None,
            prev: None,
            signature: None,
        }
    }

    /// An update operation replacing the resolved document.
    pub fn update(did: &str, kind: EntityKind, registry: &str, doc: MdipDocument) -> Self {
        Self {
            op: OperationType::Update,
            did: Some(did.to_string()),
            mdip: MdipMeta {
                version: MDIP_VERSION,
                kind,
                registry: registry.to_string(),
            },
            public_jwk: None,
            controller: None,
            data: None,
            doc: Some(doc),
            prev: None,
            signature: None,
        }
    }

    /// A deactivate operation retiring the DID.
    pub fn deactivate(did: &str, kind: EntityKind, registry: &str) -> Self {
        Self {
            op: OperationType::Deactivate,
            did: Some(did.to_string()),
            mdip: MdipMeta {
                version: MDIP_VERSION,
                kind,
                registry: registry.to_string(),
            },
            public_jwk: None,
            controller: None,
            data: None,
            doc: None,
            prev: None,
            signature: None,
        }
    }

    /// Attach a data payload (wallet backup operations carry both a key
    /// and a payload).
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Chain this operation after the given operation hash.
    pub fn with_prev(mut self, prev: &str) -> Self {
        self.prev = Some(prev.to_string());
        self
    }

    /// Sign this operation's canonical form, signature detached.
    pub fn sign(mut self, signer: Option<&str>, private_jwk: &EcJwk) -> Result<Self> {
        self.signature = None;
        let hash = signing::hash_json(&serde_json::to_value(&self)?);
        let value = signing::sign_hash(&hash, private_jwk)?;
        self.signature = Some(OpSignature {
            signer: signer.map(str::to_string),
            signed: Utc::now(),
            hash,
            value,
        });
        Ok(self)
    }

    /// Verify this operation's signature against a public key.
    pub fn verify(&self, public_jwk: &EcJwk) -> Result<()> {
        let signature = self.signature.as_ref().ok_or(Error::InvalidSignature)?;

        let mut unsigned = self.clone();
        unsigned.signature = None;
        let hash = signing::hash_json(&serde_json::to_value(&unsigned)?);

        if hash != signature.hash {
            return Err(Error::InvalidSignature);
        }
        if !signing::verify_sig(&hash, &signature.value, public_jwk) {
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    /// Content hash of the full signed operation: the DID suffix for
    /// creates, the `prev` link for everything after.
    pub fn hash(&self) -> Result<String> {
        Ok(signing::hash_json(&serde_json::to_value(self)?))
    }

    /// Mint the DID for a signed create operation.
    pub fn did(&self) -> Result<Did> {
        Ok(Did::from_operation(&serde_json::to_value(self)?))
    }

    /// When this operation was signed.
    pub fn signed_at(&self) -> Option<DateTime<Utc>> {
        self.signature.as_ref().map(|s| s.signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypair;
    use k256::SecretKey;
    use rand::rngs::OsRng;

    fn keypair() -> Keypair {
        Keypair::from_secret_key(&SecretKey::random(&mut OsRng))
    }

    #[test]
    fn test_create_agent_sign_verify() {
        let kp = keypair();
        let op = Operation::create_agent(DEFAULT_REGISTRY, kp.public_jwk.clone())
            .sign(None, &kp.private_jwk)
            .unwrap();

        assert!(op.signature.is_some());
        op.verify(&kp.public_jwk).unwrap();
    }

    #[test]
    fn test_tampered_operation_fails() {
        let kp = keypair();
        let mut op = Operation::create_agent(DEFAULT_REGISTRY, kp.public_jwk.clone())
            .sign(None, &kp.private_jwk)
            .unwrap();

        op.mdip.registry = "BTC".to_string();
        assert!(op.verify(&kp.public_jwk).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp = keypair();
        let other = keypair();
        let op = Operation::create_agent(DEFAULT_REGISTRY, kp.public_jwk.clone())
            .sign(None, &kp.private_jwk)
            .unwrap();

        assert!(op.verify(&other.public_jwk).is_err());
    }

    #[test]
    fn test_signed_operations_mint_distinct_dids() {
        let kp = keypair();
        let a = Operation::create_agent(DEFAULT_REGISTRY, kp.public_jwk.clone())
            .sign(None, &kp.private_jwk)
            .unwrap();
        let b = Operation::create_asset(DEFAULT_REGISTRY, "did:mdip:x", serde_json::json!(1))
            .sign(Some("did:mdip:x"), &kp.private_jwk)
            .unwrap();

        assert_ne!(a.did().unwrap(), b.did().unwrap());
    }

    #[test]
    fn test_wire_shape() {
        let kp = keypair();
        let op = Operation::create_agent("peerbit", kp.public_jwk.clone())
            .sign(None, &kp.private_jwk)
            .unwrap();
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(json["op"], "create");
        assert_eq!(json["mdip"]["version"], 1);
        assert_eq!(json["mdip"]["type"], "agent");
        assert_eq!(json["mdip"]["registry"], "peerbit");
        assert!(json["publicJwk"].is_object());
        assert!(json["signature"]["hash"].is_string());
        assert!(json.get("did").is_none());
    }
}
