//! Verifiable credentials and the challenge/response protocol.
//!
//! Pipeline: a schema DID describes a credential; binding shapes an
//! unsigned VC for a subject; attestation signs and seals it to the
//! subject; the subject accepts it into `held`; a verifier's challenge is
//! answered with re-encrypted copies of matching credentials; verification
//! filters out anything unsigned, mismatched, or revoked.

use crate::keymaster::{AssetData, Keymaster};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use mdip_core::{EntityKind, Operation};
use mdip_gatekeeper::{Gatekeeper, GatekeeperError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How long an issued challenge stays answerable.
const CHALLENGE_VALIDITY: Duration = Duration::hours(1);

/// One credential requirement in a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    /// Schema DID the presented credential must be bound to.
    pub schema: String,
    /// Acceptable issuers. Empty means any issuer.
    #[serde(default)]
    pub attestors: Vec<String>,
}

/// A verifier's credential request, anchored as a data DID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub credentials: Vec<CredentialRequest>,
}

/// A challenge issued to a specific subject, with a validity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundChallenge {
    /// The underlying challenge DID.
    pub challenge: String,
    /// Verifier DID.
    pub from: String,
    /// Subject DID.
    pub to: String,
    pub valid_from: chrono::DateTime<Utc>,
    pub valid_until: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Value>,
}

/// One presented credential: the issuer's attestation DID and a copy
/// re-encrypted to the verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPresentation {
    pub vc: String,
    pub vp: String,
}

/// A subject's answer to a bound challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// The bound-challenge envelope DID being answered.
    pub challenge: String,
    pub credentials: Vec<CredentialPresentation>,
}

/// Minimal valid instance for a JSON Schema (draft-07).
///
/// `default` wins, else the first `enum` variant, else the type's zero
/// value; objects recurse over `properties`. All declared properties are
/// emitted, required or not.
pub fn sample_from_schema(schema: &Value) -> Value {
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|variants| variants.first())
    {
        return first.clone();
    }

    match schema.get("type").and_then(Value::as_str) {
        Some("string") => json!(""),
        Some("number") | Some("integer") => json!(0),
        Some("boolean") => json!(false),
        Some("array") => json!([]),
        Some("null") => Value::Null,
        // Untyped schemas are treated as objects, the common case for
        // top-level credential schemas.
        Some("object") | None => {
            let mut object = serde_json::Map::new();
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, subschema) in properties {
                    object.insert(key.clone(), sample_from_schema(subschema));
                }
            }
            Value::Object(object)
        }
        Some(_) => Value::Null,
    }
}

impl<G: Gatekeeper> Keymaster<G> {
    // ========================================================================
    // Credentials
    // ========================================================================

    /// Anchor a credential schema under the current identity.
    pub async fn create_credential(&mut self, schema: &Value) -> Result<String> {
        let valid = schema
            .as_object()
            .is_some_and(|map| !map.is_empty());
        if !valid {
            return Err(Error::InvalidInput);
        }
        self.create_owned_asset(AssetData::Schema(schema.clone()))
            .await
    }

    /// Shape an unsigned credential for a subject over a schema.
    pub async fn bind_credential(&self, schema_did: &str, subject_did: &str) -> Result<Value> {
        let AssetData::Schema(schema) = self.resolve_asset(schema_did).await? else {
            return Err(Error::InvalidInput);
        };
        let did = self.current_did()?;

        Ok(json!({
            "@context": ["https://www.w3.org/ns/credentials/v2"],
            "type": ["VerifiableCredential", schema_did],
            "issuer": did,
            "validFrom": Utc::now(),
            "credentialSubject": { "id": subject_did },
            "credential": sample_from_schema(&schema),
        }))
    }

    /// Sign a bound credential and seal it to its subject. Returns the
    /// attestation (envelope) DID.
    pub async fn attest_credential(&mut self, credential: &Value) -> Result<String> {
        let did = self.current_did()?;
        if credential["issuer"].as_str() != Some(did.as_str()) {
            return Err(Error::InvalidVc);
        }
        let subject = credential["credentialSubject"]["id"]
            .as_str()
            .ok_or(Error::InvalidVc)?
            .to_string();

        let signed = self.add_signature(credential)?;
        self.encrypt_json(&signed, &subject).await
    }

    /// Accept an attestation addressed to the current identity.
    ///
    /// Returns false (without holding it) when the signature does not
    /// verify or the credential names a different subject.
    pub async fn accept_credential(&mut self, did: &str) -> Result<bool> {
        let (name, id) = self.current_identity()?;
        let credential = self.decrypt_json(did).await?;

        if !self.verify_signature(&credential).await {
            return Ok(false);
        }
        if credential["credentialSubject"]["id"].as_str() != Some(id.did.as_str()) {
            return Ok(false);
        }

        self.save_held(&name, did)?;
        Ok(true)
    }

    /// Revoke an attestation this identity issued.
    ///
    /// True on first-time deactivation; false when it was already
    /// deactivated or this identity does not control it.
    pub async fn revoke_credential(&mut self, did: &str) -> Result<bool> {
        let current = self.current_did()?;
        let credential = self.decrypt_json(did).await?;
        if credential["issuer"].as_str() != Some(current.as_str()) {
            return Ok(false);
        }

        let doc = self.gatekeeper.resolve_did(did).await?;
        if doc.is_deactivated() {
            return Ok(false);
        }

        let (_, id) = self.current_identity()?;
        let keypair = self.wallet.keypair_at(id.account, id.index)?;
        let operation = Operation::deactivate(did, EntityKind::Asset, &self.registry)
            .with_prev(&doc.did_document_metadata.version_id)
            .sign(Some(&id.did), &keypair.private_jwk)?;

        match self.gatekeeper.delete_did(&operation).await {
            Ok(applied) => Ok(applied),
            Err(GatekeeperError::InvalidOperation(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Publish a held credential in the identity's document manifest.
    ///
    /// With `reveal` false the credential body is redacted, proving
    /// possession without disclosure. Returns the published form.
    pub async fn publish_credential(&mut self, did: &str, reveal: bool) -> Result<Value> {
        let (_, id) = self.current_identity()?;
        if !id.held.iter().any(|held| held == did) {
            return Err(Error::InvalidInput);
        }

        let mut credential = self.decrypt_json(did).await?;
        if !reveal {
            credential["credential"] = Value::Null;
        }

        let key = did.to_string();
        let published = credential.clone();
        self.update_current_document(move |doc| {
            doc.did_document_metadata
                .manifest
                .get_or_insert_with(Default::default)
                .insert(key, credential);
        })
        .await?;

        Ok(published)
    }

    /// Remove a credential from the manifest.
    pub async fn unpublish_credential(&mut self, did: &str) -> Result<()> {
        let (_, id) = self.current_identity()?;
        let doc = self.gatekeeper.resolve_did(&id.did).await?;
        let present = doc
            .did_document_metadata
            .manifest
            .as_ref()
            .is_some_and(|manifest| manifest.contains_key(did));
        if !present {
            return Err(Error::InvalidInput);
        }

        let key = did.to_string();
        self.update_current_document(move |doc| {
            if let Some(manifest) = doc.did_document_metadata.manifest.as_mut() {
                manifest.remove(&key);
            }
        })
        .await
    }

    // ========================================================================
    // Challenge / response / verify
    // ========================================================================

    /// Anchor a challenge under the current identity.
    pub async fn create_challenge(&mut self, challenge: &Challenge) -> Result<String> {
        self.create_owned_asset(AssetData::Challenge(challenge.clone()))
            .await
    }

    /// Issue a challenge to a subject: bind, sign, and seal it. Returns
    /// the bound-challenge envelope DID.
    pub async fn issue_challenge(&mut self, challenge_did: &str, subject: &str) -> Result<String> {
        let AssetData::Challenge(_) = self.resolve_asset(challenge_did).await? else {
            return Err(Error::InvalidInput);
        };
        let subject_did = self.lookup_did(subject)?;
        let now = Utc::now();

        let bound = json!({
            "challenge": challenge_did,
            "from": self.current_did()?,
            "to": subject_did,
            "validFrom": now,
            "validUntil": now + CHALLENGE_VALIDITY,
        });
        let signed = self.add_signature(&bound)?;
        self.encrypt_json(&signed, &subject_did).await
    }

    /// Answer a bound challenge with matching held credentials.
    ///
    /// Each requested credential is matched against `held` by schema and
    /// attestor; matches are re-encrypted to the verifier. Requests with
    /// no match simply drop out of the response.
    pub async fn create_response(&mut self, bound_did: &str) -> Result<String> {
        let bound_value = self.decrypt_json(bound_did).await?;
        if !self.verify_signature(&bound_value).await {
            return Err(Error::InvalidInput);
        }
        let bound: BoundChallenge = serde_json::from_value(bound_value)?;

        let (_, id) = self.current_identity()?;
        if bound.to != id.did {
            return Err(Error::InvalidInput);
        }
        if bound.valid_until < Utc::now() {
            return Err(Error::InvalidInput);
        }

        let AssetData::Challenge(challenge) = self.resolve_asset(&bound.challenge).await? else {
            return Err(Error::InvalidInput);
        };

        // Match first (read-only), then seal the matches to the verifier.
        let mut matches = Vec::new();
        for request in &challenge.credentials {
            for held_did in &id.held {
                let Ok(credential) = self.decrypt_json(held_did).await else {
                    continue;
                };
                if satisfies(&credential, request) {
                    matches.push((held_did.clone(), credential));
                    break;
                }
            }
        }

        let mut credentials = Vec::new();
        for (vc, credential) in matches {
            let vp = self.encrypt_json(&credential, &bound.from).await?;
            credentials.push(CredentialPresentation { vc, vp });
        }

        let response = ChallengeResponse {
            challenge: bound_did.to_string(),
            credentials,
        };
        self.encrypt_json(&serde_json::to_value(response)?, &bound.from)
            .await
    }

    /// Verify a presentation against the challenge it answers.
    ///
    /// Returns the decrypted credentials that survive every check;
    /// revoked, unsigned, or mismatched entries drop out, shortening the
    /// list.
    pub async fn verify_response(&self, response_did: &str) -> Result<Vec<Value>> {
        let response: ChallengeResponse =
            serde_json::from_value(self.decrypt_json(response_did).await?)?;
        let bound: BoundChallenge =
            serde_json::from_value(self.decrypt_json(&response.challenge).await?)?;

        let AssetData::Challenge(challenge) = self.resolve_asset(&bound.challenge).await? else {
            return Err(Error::InvalidInput);
        };

        let mut verified = Vec::new();
        for request in &challenge.credentials {
            for presentation in &response.credentials {
                let Ok(credential) = self.decrypt_json(&presentation.vp).await else {
                    continue;
                };
                if !satisfies(&credential, request) {
                    continue;
                }
                if !self.verify_signature(&credential).await {
                    continue;
                }
                // Revocation check: the attestation DID must still be live.
                let Ok(doc) = self.gatekeeper.resolve_did(&presentation.vc).await else {
                    continue;
                };
                if doc.is_deactivated() {
                    continue;
                }
                verified.push(credential);
                break;
            }
        }

        Ok(verified)
    }
}

/// Schema and attestor matching for one credential against one request.
fn satisfies(credential: &Value, request: &CredentialRequest) -> bool {
    let schema_matches = credential["type"]
        .as_array()
        .is_some_and(|types| types.iter().any(|t| t.as_str() == Some(&request.schema)));
    if !schema_matches {
        return false;
    }

    if request.attestors.is_empty() {
        return true;
    }
    credential["issuer"]
        .as_str()
        .is_some_and(|issuer| request.attestors.iter().any(|a| a == issuer))
}
