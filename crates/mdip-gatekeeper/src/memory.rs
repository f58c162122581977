//! In-memory reference registry.
//!
//! Stores the signed operation chain for every DID and materializes
//! documents by replaying it. Enforces the same rules a production
//! gatekeeper must: signatures verify against the prior version's
//! controlling key, updates chain through `prev`, history is linear, and
//! submissions are deduplicated by operation hash.

use crate::{Gatekeeper, GatekeeperError, Result, KNOWN_REGISTRIES};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdip_core::{
    DidDocument, DocumentMetadata, EcJwk, MdipDocument, Operation, OperationType,
    VerificationMethod,
};
use std::collections::HashMap;
use std::sync::RwLock;

type OpLog = HashMap<String, Vec<Operation>>;

/// A gatekeeper that keeps all state in process memory.
#[derive(Default)]
pub struct MemoryGatekeeper {
    ops: RwLock<OpLog>,
}

impl MemoryGatekeeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of DIDs known to this registry.
    pub fn count(&self) -> usize {
        self.ops.read().unwrap().len()
    }
}

#[async_trait]
impl Gatekeeper for MemoryGatekeeper {
    async fn create_did(&self, operation: &Operation) -> Result<String> {
        if operation.op != OperationType::Create {
            return Err(GatekeeperError::InvalidOperation(
                "expected a create operation".into(),
            ));
        }
        if !KNOWN_REGISTRIES.contains(&operation.mdip.registry.as_str()) {
            return Err(GatekeeperError::InvalidOperation(format!(
                "unknown registry '{}'",
                operation.mdip.registry
            )));
        }

        let did = operation.did()?.to_string();
        let mut ops = self.ops.write().unwrap();

        // Content-addressed: resubmitting the same operation mints the
        // same DID, so an existing chain means this is a duplicate.
        if ops.contains_key(&did) {
            return Ok(did);
        }

        let key = match operation.public_jwk.as_ref() {
            // Agent creates are self-certifying.
            Some(jwk) => jwk.clone(),
            // Asset creates are signed by their controller.
            None => {
                let controller = operation.controller.as_deref().ok_or_else(|| {
                    GatekeeperError::InvalidOperation(
                        "create requires a public key or a controller".into(),
                    )
                })?;
                controller_key(&ops, controller, operation.signed_at())?
            }
        };

        operation
            .verify(&key)
            .map_err(|_| GatekeeperError::InvalidOperation("signature does not verify".into()))?;

        ops.insert(did.clone(), vec![operation.clone()]);
        Ok(did)
    }

    async fn resolve_did_at(
        &self,
        did: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<MdipDocument> {
        let ops = self.ops.read().unwrap();
        materialize(&ops, did, at)
    }

    async fn update_did(&self, operation: &Operation) -> Result<bool> {
        self.append(operation, OperationType::Update)
    }

    async fn delete_did(&self, operation: &Operation) -> Result<bool> {
        self.append(operation, OperationType::Deactivate)
    }
}

impl MemoryGatekeeper {
    fn append(&self, operation: &Operation, expected: OperationType) -> Result<bool> {
        if operation.op != expected {
            return Err(GatekeeperError::InvalidOperation(format!(
                "expected a {:?} operation",
                expected
            )));
        }
        let did = operation
            .did
            .as_deref()
            .ok_or_else(|| GatekeeperError::InvalidOperation("missing target DID".into()))?
            .to_string();

        let mut ops = self.ops.write().unwrap();
        let chain = ops
            .get(&did)
            .ok_or_else(|| GatekeeperError::NotFound(did.clone()))?;

        let op_hash = operation.hash()?;
        for prior in chain {
            if prior.hash()? == op_hash {
                return Ok(false);
            }
        }

        let current = materialize(&ops, &did, None)?;
        if current.is_deactivated() {
            return match expected {
                OperationType::Deactivate => Ok(false),
                _ => Err(GatekeeperError::InvalidOperation(
                    "DID is deactivated".into(),
                )),
            };
        }

        // Linear history: the operation must chain from the latest version.
        if operation.prev.as_deref() != Some(current.did_document_metadata.version_id.as_str()) {
            return Err(GatekeeperError::InvalidOperation(
                "operation does not chain from the latest version".into(),
            ));
        }

        // The prior version's controlling key must have signed.
        let key = match current.public_key_jwk() {
            Some(jwk) => jwk.clone(),
            None => controller_key(
                &ops,
                &current.did_document.controller,
                operation.signed_at(),
            )?,
        };
        operation
            .verify(&key)
            .map_err(|_| GatekeeperError::InvalidOperation("signature does not verify".into()))?;

        ops.get_mut(&did)
            .expect("chain existence checked above")
            .push(operation.clone());
        Ok(true)
    }
}

/// The controlling agent's key as of `at`.
fn controller_key(ops: &OpLog, controller: &str, at: Option<DateTime<Utc>>) -> Result<EcJwk> {
    let doc = materialize(ops, controller, at)?;
    if doc.is_deactivated() {
        return Err(GatekeeperError::InvalidOperation(format!(
            "controller {} is deactivated",
            controller
        )));
    }
    doc.public_key_jwk().cloned().ok_or_else(|| {
        GatekeeperError::InvalidOperation(format!("controller {} has no key", controller))
    })
}

/// Replay a DID's operation chain into a resolved document.
fn materialize(ops: &OpLog, did: &str, at: Option<DateTime<Utc>>) -> Result<MdipDocument> {
    let chain = ops
        .get(did)
        .ok_or_else(|| GatekeeperError::NotFound(did.to_string()))?;

    let in_range = |op: &Operation| match (at, op.signed_at()) {
        (Some(cutoff), Some(signed)) => signed <= cutoff,
        _ => true,
    };

    let create = &chain[0];
    if !in_range(create) {
        return Err(GatekeeperError::NotFound(did.to_string()));
    }

    let mut doc = match create.public_jwk.as_ref() {
        Some(jwk) => agent_document(did, jwk),
        None => DidDocument {
            id: did.to_string(),
            controller: create.controller.clone().unwrap_or_default(),
            ..Default::default()
        },
    };
    let mut metadata = DocumentMetadata {
        created: create.signed_at(),
        version_id: create.hash()?,
        data: create.data.clone(),
        ..Default::default()
    };

    for op in chain[1..].iter().filter(|op| in_range(op)) {
        metadata.version_id = op.hash()?;
        metadata.updated = op.signed_at();

        match op.op {
            OperationType::Update => {
                if let Some(next) = op.doc.as_ref() {
                    doc = next.did_document.clone();
                    metadata.data = next.did_document_metadata.data.clone();
                    metadata.manifest = next.did_document_metadata.manifest.clone();
                    metadata.vault = next.did_document_metadata.vault.clone();
                }
            }
            OperationType::Deactivate => {
                // Deactivated DIDs resolve to an empty document.
                doc = DidDocument::default();
                metadata.deactivated = true;
                metadata.data = None;
                metadata.manifest = None;
                metadata.vault = None;
            }
            OperationType::Create => {}
        }
    }

    Ok(MdipDocument {
        did_document: doc,
        did_document_metadata: metadata,
    })
}

fn agent_document(did: &str, jwk: &EcJwk) -> DidDocument {
    DidDocument {
        id: did.to_string(),
        controller: did.to_string(),
        verification_method: vec![VerificationMethod {
            id: "#key-1".to_string(),
            type_: "EcdsaSecp256k1VerificationKey2019".to_string(),
            controller: did.to_string(),
            public_key_jwk: jwk.to_public(),
        }],
        authentication: vec!["#key-1".to_string()],
    }
}
