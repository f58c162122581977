//! Resolved DID document structure.
//!
//! This is what the gatekeeper returns from resolution: the document
//! proper plus registry-maintained metadata. Agent documents carry a
//! verification method; asset documents carry only id and controller,
//! with their payload in `didDocumentMetadata.data`.

use crate::EcJwk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A verification method (public key) in a DID document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Key reference within the document (e.g., "#key-1").
    pub id: String,
    /// Key type.
    #[serde(rename = "type")]
    pub type_: String,
    /// Controller DID.
    pub controller: String,
    /// The public key.
    pub public_key_jwk: EcJwk,
}

/// The document proper: identifier, controller, and keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// The DID this document describes. Empty once deactivated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Controller of this DID (self for agents, the creator for assets).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub controller: String,
    /// Verification methods (agent documents only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    /// Key references that can authenticate as this DID.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,
}

/// Registry-maintained metadata for a resolved document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// When the create operation was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// When the most recent update was accepted, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Hash of the latest operation. Updates chain their `prev` from this.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_id: String,
    /// True once a deactivate operation was accepted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deactivated: bool,
    /// Anchored asset payload, if this is a data DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Published credentials, keyed by attestation DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<BTreeMap<String, serde_json::Value>>,
    /// Identity vault DID for recovery, if one was anchored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<String>,
}

/// The full resolution result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MdipDocument {
    pub did_document: DidDocument,
    pub did_document_metadata: DocumentMetadata,
}

impl MdipDocument {
    /// The current public key, if this is an agent document.
    pub fn public_key_jwk(&self) -> Option<&EcJwk> {
        self.did_document
            .verification_method
            .first()
            .map(|vm| &vm.public_key_jwk)
    }

    /// True if this document has been deactivated.
    pub fn is_deactivated(&self) -> bool {
        self.did_document_metadata.deactivated
    }
}
