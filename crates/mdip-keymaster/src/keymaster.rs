//! The keymaster: identity lifecycle, messaging, and signatures.
//!
//! A `Keymaster` owns the wallet, its store, and a gatekeeper client.
//! Mutating operations complete their registry I/O first, then mutate the
//! in-memory wallet and save, so a failed registry call never advances
//! local state.

use crate::credential::Challenge;
use crate::{Error, Identity, Result, Wallet, WalletStore};
use chrono::{DateTime, Utc};
use mdip_core::{cipher, signing, EntityKind, MdipDocument, Operation, DEFAULT_REGISTRY};
use mdip_gatekeeper::Gatekeeper;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Asymmetric message envelope, anchored as a data DID.
///
/// The same plaintext is sealed twice: once to the sender's own key and
/// once to the receiver's, so either party can open it later. `created`
/// pins the sender's key epoch for historical resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub created: DateTime<Utc>,
    pub cipher_hash: String,
    pub cipher_sender: String,
    pub cipher_receiver: String,
}

/// Payload anchored in a data DID, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetData {
    /// A sealed message envelope.
    Encrypted(Envelope),
    /// A credential schema (JSON Schema document).
    Schema(Value),
    /// A verifier's credential request.
    Challenge(Challenge),
    /// An encrypted wallet or identity backup.
    Backup(String),
}

/// Identity wallet and credential engine over a gatekeeper registry.
pub struct Keymaster<G: Gatekeeper> {
    pub(crate) wallet: Wallet,
    pub(crate) store: WalletStore,
    pub(crate) gatekeeper: G,
    pub(crate) registry: String,
}

impl<G: Gatekeeper> Keymaster<G> {
    /// Open (or initialize) the wallet at `store` against a gatekeeper.
    pub fn new(store: WalletStore, gatekeeper: G) -> Result<Self> {
        let wallet = store.load()?;
        Ok(Self {
            wallet,
            store,
            gatekeeper,
            registry: DEFAULT_REGISTRY.to_string(),
        })
    }

    /// Use a different default registry for newly created DIDs.
    pub fn with_registry(mut self, registry: &str) -> Self {
        self.registry = registry.to_string();
        self
    }

    /// Read-only view of the wallet.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn gatekeeper(&self) -> &G {
        &self.gatekeeper
    }

    /// Replace the wallet with a fresh one, unconditionally.
    ///
    /// Returns the mnemonic phrase of the new wallet; with `mnemonic`
    /// supplied this re-creates a wallet over a known seed.
    pub fn new_wallet(&mut self, mnemonic: Option<&str>) -> Result<String> {
        let mnemonic = match mnemonic {
            Some(phrase) => mdip_core::hd::parse_mnemonic(phrase)?,
            None => mdip_core::hd::generate_mnemonic(),
        };
        self.wallet = Wallet::new(&mnemonic)?;
        self.store.save(&self.wallet)?;
        Ok(mnemonic.to_string())
    }

    /// Decrypt the stored mnemonic (the backup-flow round trip).
    pub fn decrypt_mnemonic(&self) -> Result<String> {
        self.wallet.decrypt_mnemonic()
    }

    // ========================================================================
    // Identity lifecycle
    // ========================================================================

    /// Create a new identity and make it current. Returns its DID.
    pub async fn create_id(&mut self, name: &str, registry: Option<&str>) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput);
        }
        if self.wallet.name_taken(name) {
            return Err(Error::NameTaken(name.to_string()));
        }

        let account = self.wallet.counter;
        let keypair = self.wallet.keypair_at(account, 0)?;
        let operation = Operation::create_agent(
            registry.unwrap_or(&self.registry),
            keypair.public_jwk.clone(),
        )
        .sign(None, &keypair.private_jwk)?;

        let did = self.gatekeeper.create_did(&operation).await?;

        self.wallet.ids.insert(
            name.to_string(),
            Identity {
                did: did.clone(),
                account,
                index: 0,
                owned: Vec::new(),
                held: Vec::new(),
            },
        );
        self.wallet.current = name.to_string();
        self.wallet.counter += 1;
        self.store.save(&self.wallet)?;

        Ok(did)
    }

    /// Switch the current identity.
    pub fn use_id(&mut self, name: &str) -> Result<()> {
        if !self.wallet.ids.contains_key(name) {
            return Err(Error::NoSuchId(name.to_string()));
        }
        self.wallet.current = name.to_string();
        self.store.save(&self.wallet)?;
        Ok(())
    }

    /// Identity names, sorted; the bool marks the current one.
    pub fn list_ids(&self) -> Vec<(String, bool)> {
        self.wallet
            .ids
            .keys()
            .map(|name| (name.clone(), *name == self.wallet.current))
            .collect()
    }

    /// Forget an identity locally. Its DID remains in the registry.
    pub fn remove_id(&mut self, name: &str) -> Result<()> {
        if self.wallet.ids.remove(name).is_none() {
            return Err(Error::NoSuchId(name.to_string()));
        }
        if self.wallet.current == name {
            self.wallet.current = String::new();
        }
        self.store.save(&self.wallet)?;
        Ok(())
    }

    /// Rename an identity, keeping its derivation state.
    pub fn rename_id(&mut self, name: &str, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::InvalidInput);
        }
        if self.wallet.name_taken(new_name) {
            return Err(Error::NameTaken(new_name.to_string()));
        }
        let id = self
            .wallet
            .ids
            .remove(name)
            .ok_or_else(|| Error::NoSuchId(name.to_string()))?;
        self.wallet.ids.insert(new_name.to_string(), id);
        if self.wallet.current == name {
            self.wallet.current = new_name.to_string();
        }
        self.store.save(&self.wallet)?;
        Ok(())
    }

    /// Rotate the current identity's key.
    ///
    /// The update is signed with the old key; the wallet index advances
    /// only after the registry accepts it. Prior indices remain derivable,
    /// which is what keeps old ciphertexts readable.
    pub async fn rotate_keys(&mut self) -> Result<()> {
        let (name, id) = self.wallet.current_id()?;
        let name = name.to_string();
        let id = id.clone();

        let current = self.wallet.keypair_at(id.account, id.index)?;
        let next = self.wallet.keypair_at(id.account, id.index + 1)?;

        let doc = self.gatekeeper.resolve_did(&id.did).await?;
        let mut rotated = doc.clone();
        let method = rotated
            .did_document
            .verification_method
            .first_mut()
            .ok_or(Error::InvalidInput)?;
        method.public_key_jwk = next.public_jwk.to_public();

        let operation = Operation::update(&id.did, EntityKind::Agent, &self.registry, rotated)
            .with_prev(&doc.did_document_metadata.version_id)
            .sign(Some(&id.did), &current.private_jwk)?;

        self.gatekeeper.update_did(&operation).await?;

        let entry = self.wallet.ids.get_mut(&name).ok_or(Error::NoCurrentId)?;
        entry.index += 1;
        let index = entry.index;

        // The registry already accepted the rotation; losing the save here
        // would strand the wallet one index behind, so retry once and leave
        // a trail for manual recovery.
        if self.store.save(&self.wallet).is_err() {
            warn!(identity = %name, index, "wallet save failed after key rotation, retrying");
            self.store.save(&self.wallet)?;
        }
        Ok(())
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Alias a DID under a human-readable name.
    pub fn add_name(&mut self, name: &str, did: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || did.is_empty() {
            return Err(Error::InvalidInput);
        }
        if self.wallet.name_taken(name) {
            return Err(Error::NameInUse);
        }
        self.wallet.names.insert(name.to_string(), did.to_string());
        self.store.save(&self.wallet)?;
        Ok(())
    }

    /// Remove an alias. Removing a missing alias is not an error.
    pub fn remove_name(&mut self, name: &str) -> Result<bool> {
        self.wallet.names.remove(name);
        self.store.save(&self.wallet)?;
        Ok(true)
    }

    /// Resolve a name (identity or alias) or pass a DID through.
    pub fn lookup_did(&self, name_or_did: &str) -> Result<String> {
        if let Some(id) = self.wallet.ids.get(name_or_did) {
            return Ok(id.did.clone());
        }
        if let Some(did) = self.wallet.names.get(name_or_did) {
            return Ok(did.clone());
        }
        if name_or_did.starts_with("did:") {
            return Ok(name_or_did.to_string());
        }
        Err(Error::NoSuchId(name_or_did.to_string()))
    }

    /// Resolve a DID (or name) to its current document.
    pub async fn resolve_did(&self, name_or_did: &str) -> Result<MdipDocument> {
        let did = self.lookup_did(name_or_did)?;
        Ok(self.gatekeeper.resolve_did(&did).await?)
    }

    // ========================================================================
    // Backup and recovery
    // ========================================================================

    /// Encrypt the wallet to its own master keypair and anchor it.
    pub async fn backup_wallet(&mut self) -> Result<String> {
        let root = self.wallet.root_keypair()?;
        let plaintext = signing::canonicalize(&serde_json::to_value(&self.wallet)?);
        let sealed = cipher::encrypt_message(&root.public_jwk, &root.private_jwk, &plaintext)?;

        let operation = Operation::create_agent(&self.registry, root.public_jwk.to_public())
            .with_data(serde_json::to_value(AssetData::Backup(sealed))?)
            .sign(None, &root.private_jwk)?;

        Ok(self.gatekeeper.create_did(&operation).await?)
    }

    /// Replace the wallet from a backup DID.
    ///
    /// Only a wallet over the same seed can decrypt the backup; anything
    /// else fails with `CannotRecover` and leaves current state untouched.
    pub async fn recover_wallet(&mut self, did: &str) -> Result<()> {
        let AssetData::Backup(sealed) = self.resolve_asset(did).await? else {
            return Err(Error::CannotRecover);
        };

        let root = self.wallet.root_keypair()?;
        let plaintext = cipher::decrypt_message(&root.public_jwk, &root.private_jwk, &sealed)
            .map_err(|_| Error::CannotRecover)?;
        let wallet: Wallet = serde_json::from_str(&plaintext).map_err(|_| Error::CannotRecover)?;

        self.wallet = wallet;
        self.store.save(&self.wallet)?;
        Ok(())
    }

    /// Anchor an encrypted vault for the current identity and point its
    /// document at it. Returns the vault DID.
    pub async fn backup_id(&mut self) -> Result<String> {
        let (name, id) = self.wallet.current_id()?;
        let name = name.to_string();
        let id = id.clone();

        // Sealed to the master keypair: only this wallet's seed reopens it.
        let root = self.wallet.root_keypair()?;
        let blob = json!({ "name": name, "id": id });
        let sealed = cipher::encrypt_message(
            &root.public_jwk,
            &root.private_jwk,
            &signing::canonicalize(&blob),
        )?;

        let keypair = self.wallet.keypair_at(id.account, id.index)?;
        let operation = Operation::create_asset(
            &self.registry,
            &id.did,
            serde_json::to_value(AssetData::Backup(sealed))?,
        )
        .sign(Some(&id.did), &keypair.private_jwk)?;
        let vault = self.gatekeeper.create_did(&operation).await?;

        let doc = self.gatekeeper.resolve_did(&id.did).await?;
        let mut updated = doc.clone();
        updated.did_document_metadata.vault = Some(vault.clone());
        let operation = Operation::update(&id.did, EntityKind::Agent, &self.registry, updated)
            .with_prev(&doc.did_document_metadata.version_id)
            .sign(Some(&id.did), &keypair.private_jwk)?;
        self.gatekeeper.update_did(&operation).await?;

        Ok(vault)
    }

    /// Reconstruct an identity from its DID's vault.
    ///
    /// Fails with `CannotRecoverId` when this wallet's seed cannot decrypt
    /// the vault blob (it belongs to a different wallet).
    pub async fn recover_id(&mut self, did: &str) -> Result<String> {
        let doc = self.gatekeeper.resolve_did(did).await?;
        let vault_did = doc
            .did_document_metadata
            .vault
            .ok_or(Error::CannotRecoverId)?;
        let AssetData::Backup(sealed) = self.resolve_asset(&vault_did).await? else {
            return Err(Error::CannotRecoverId);
        };

        let root = self.wallet.root_keypair()?;
        let plaintext = cipher::decrypt_message(&root.public_jwk, &root.private_jwk, &sealed)
            .map_err(|_| Error::CannotRecoverId)?;
        let blob: Value = serde_json::from_str(&plaintext).map_err(|_| Error::CannotRecoverId)?;

        let name = blob["name"]
            .as_str()
            .ok_or(Error::CannotRecoverId)?
            .to_string();
        let id: Identity =
            serde_json::from_value(blob["id"].clone()).map_err(|_| Error::CannotRecoverId)?;

        self.wallet.counter = self.wallet.counter.max(id.account + 1);
        self.wallet.ids.insert(name.clone(), id);
        self.wallet.current = name.clone();
        self.store.save(&self.wallet)?;

        Ok(name)
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Seal a plaintext to a receiver and anchor the envelope. Returns the
    /// envelope DID, readable later by either party.
    pub async fn encrypt_message(&mut self, plaintext: &str, receiver: &str) -> Result<String> {
        let (_, id) = self.wallet.current_id()?;
        let id = id.clone();
        let keypair = self.wallet.keypair_at(id.account, id.index)?;

        let receiver_did = self.lookup_did(receiver)?;
        let receiver_doc = self.gatekeeper.resolve_did(&receiver_did).await?;
        let receiver_jwk = receiver_doc.public_key_jwk().ok_or(Error::InvalidInput)?;

        let envelope = Envelope {
            sender: id.did.clone(),
            created: Utc::now(),
            cipher_hash: signing::hash_message(plaintext),
            cipher_sender: cipher::encrypt_message(
                &keypair.public_jwk,
                &keypair.private_jwk,
                plaintext,
            )?,
            cipher_receiver: cipher::encrypt_message(
                receiver_jwk,
                &keypair.private_jwk,
                plaintext,
            )?,
        };

        self.create_owned_asset(AssetData::Encrypted(envelope)).await
    }

    /// Open an envelope DID as either sender or receiver.
    ///
    /// The sender's key is resolved as of the envelope's `created` time;
    /// our own key walk regresses from the current index until a key
    /// opens it, covering every rotation since the message was sealed.
    pub async fn decrypt_message(&self, did: &str) -> Result<String> {
        let AssetData::Encrypted(envelope) = self.resolve_asset(did).await? else {
            return Err(Error::InvalidInput);
        };

        let (_, id) = self.wallet.current_id()?;

        let sender_doc = self
            .gatekeeper
            .resolve_did_at(&envelope.sender, Some(envelope.created))
            .await?;
        let sender_jwk = sender_doc.public_key_jwk().ok_or(Error::InvalidInput)?;

        let ciphertext = if envelope.sender == id.did {
            &envelope.cipher_sender
        } else {
            &envelope.cipher_receiver
        };

        for index in (0..=id.index).rev() {
            let keypair = self.wallet.keypair_at(id.account, index)?;
            if let Ok(plaintext) =
                cipher::decrypt_message(sender_jwk, &keypair.private_jwk, ciphertext)
            {
                if signing::hash_message(&plaintext) != envelope.cipher_hash {
                    return Err(Error::TamperedCiphertext);
                }
                return Ok(plaintext);
            }
        }

        Err(Error::DecryptionFailed)
    }

    /// Seal a JSON value (canonicalized first) to a receiver.
    pub async fn encrypt_json(&mut self, value: &Value, receiver: &str) -> Result<String> {
        self.encrypt_message(&signing::canonicalize(value), receiver)
            .await
    }

    /// Open an envelope and parse the plaintext as JSON.
    pub async fn decrypt_json(&self, did: &str) -> Result<Value> {
        let plaintext = self.decrypt_message(did).await?;
        Ok(serde_json::from_str(&plaintext)?)
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    /// Sign a JSON object with the current identity's key.
    ///
    /// Any existing signature is stripped; the attached block binds the
    /// canonical form of the rest of the object.
    pub fn add_signature(&self, object: &Value) -> Result<Value> {
        let map = object.as_object().ok_or(Error::InvalidInput)?;
        let (_, id) = self.wallet.current_id()?;
        let keypair = self.wallet.keypair_at(id.account, id.index)?;

        let mut unsigned = map.clone();
        unsigned.remove("signature");
        let hash = signing::hash_json(&Value::Object(unsigned.clone()));
        let value = signing::sign_hash(&hash, &keypair.private_jwk)?;

        let mut signed = unsigned;
        signed.insert(
            "signature".to_string(),
            json!({
                "signer": id.did,
                "signed": Utc::now(),
                "hash": hash,
                "value": value,
            }),
        );
        Ok(Value::Object(signed))
    }

    /// Verify a signed JSON object against its signer's key.
    ///
    /// The signer is resolved as of the signature's `signed` time, so a
    /// later key rotation does not invalidate the signature. Malformed
    /// objects verify as `false`, never as an error.
    pub async fn verify_signature(&self, object: &Value) -> bool {
        let Some(map) = object.as_object() else {
            return false;
        };
        let Some(signature) = map.get("signature") else {
            return false;
        };
        let (Some(signer), Some(value)) = (
            signature["signer"].as_str(),
            signature["value"].as_str(),
        ) else {
            return false;
        };
        let signed_at = signature["signed"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        let mut unsigned = map.clone();
        unsigned.remove("signature");
        let hash = signing::hash_json(&Value::Object(unsigned));
        if signature["hash"].as_str() != Some(hash.as_str()) {
            return false;
        }

        let Ok(doc) = self.gatekeeper.resolve_did_at(signer, signed_at).await else {
            return false;
        };
        let Some(public_jwk) = doc.public_key_jwk() else {
            return false;
        };

        signing::verify_sig(&hash, value, public_jwk)
    }

    // ========================================================================
    // Asset helpers
    // ========================================================================

    /// Anchor a payload as a data DID controlled by the current identity,
    /// recording it in `owned`.
    pub(crate) async fn create_owned_asset(&mut self, data: AssetData) -> Result<String> {
        let (name, id) = self.wallet.current_id()?;
        let name = name.to_string();
        let id = id.clone();
        let keypair = self.wallet.keypair_at(id.account, id.index)?;

        let operation = Operation::create_asset(
            &self.registry,
            &id.did,
            serde_json::to_value(data)?,
        )
        .sign(Some(&id.did), &keypair.private_jwk)?;
        let did = self.gatekeeper.create_did(&operation).await?;

        let entry = self.wallet.ids.get_mut(&name).ok_or(Error::NoCurrentId)?;
        if !entry.owned.contains(&did) {
            entry.owned.push(did.clone());
        }
        self.store.save(&self.wallet)?;
        Ok(did)
    }

    /// Resolve a data DID's payload.
    pub(crate) async fn resolve_asset(&self, did: &str) -> Result<AssetData> {
        let doc = self.gatekeeper.resolve_did(did).await?;
        let data = doc.did_document_metadata.data.ok_or(Error::InvalidInput)?;
        serde_json::from_value(data).map_err(|_| Error::InvalidInput)
    }

    /// Update the current identity's document, chaining from its latest
    /// version. The closure edits the resolved document in place.
    pub(crate) async fn update_current_document(
        &mut self,
        edit: impl FnOnce(&mut MdipDocument),
    ) -> Result<()> {
        let (_, id) = self.wallet.current_id()?;
        let id = id.clone();
        let keypair = self.wallet.keypair_at(id.account, id.index)?;

        let doc = self.gatekeeper.resolve_did(&id.did).await?;
        let mut updated = doc.clone();
        edit(&mut updated);

        let operation = Operation::update(&id.did, EntityKind::Agent, &self.registry, updated)
            .with_prev(&doc.did_document_metadata.version_id)
            .sign(Some(&id.did), &keypair.private_jwk)?;
        self.gatekeeper.update_did(&operation).await?;
        Ok(())
    }

    /// The current identity's DID, for callers that only need the string.
    pub fn current_did(&self) -> Result<String> {
        Ok(self.wallet.current_id()?.1.did.clone())
    }

    pub(crate) fn current_identity(&self) -> Result<(String, Identity)> {
        let (name, id) = self.wallet.current_id()?;
        Ok((name.to_string(), id.clone()))
    }

    pub(crate) fn save_held(&mut self, name: &str, did: &str) -> Result<()> {
        let entry = self.wallet.ids.get_mut(name).ok_or(Error::NoCurrentId)?;
        if !entry.held.iter().any(|held| held == did) {
            entry.held.push(did.to_string());
        }
        self.store.save(&self.wallet)?;
        Ok(())
    }
}
