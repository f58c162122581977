//! End-to-end scenarios over an in-process gatekeeper.

use mdip_gatekeeper::MemoryGatekeeper;
use mdip_keymaster::{Challenge, CredentialRequest, Error, Keymaster, WalletStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn open_wallet(dir: &TempDir, name: &str, registry: &Arc<MemoryGatekeeper>) -> Keymaster<Arc<MemoryGatekeeper>> {
    let store = WalletStore::new(dir.path().join(format!("{}.json", name)));
    Keymaster::new(store, Arc::clone(registry)).unwrap()
}

#[tokio::test]
async fn fresh_wallet_is_empty() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let km = open_wallet(&dir, "w", &registry);

    let wallet = km.wallet();
    assert_eq!(wallet.counter, 0);
    assert!(wallet.ids.is_empty());
    assert_eq!(km.decrypt_mnemonic().unwrap().split_whitespace().count(), 12);
}

#[tokio::test]
async fn create_id_twice_fails_with_name_taken() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut km = open_wallet(&dir, "w", &registry);

    km.create_id("Bob", None).await.unwrap();
    assert_eq!(km.wallet().current, "Bob");
    assert_eq!(km.wallet().counter, 1);
    assert_eq!(km.wallet().ids["Bob"].account, 0);

    let err = km.create_id("Bob", None).await.unwrap_err();
    assert!(matches!(err, Error::NameTaken(ref name) if name == "Bob"));
    assert_eq!(err.to_string(), "Already have an ID named Bob");
}

#[tokio::test]
async fn both_parties_decrypt_an_envelope() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);
    let mut bob = open_wallet(&dir, "bob", &registry);

    alice.create_id("Alice", None).await.unwrap();
    let bob_did = bob.create_id("Bob", None).await.unwrap();

    let envelope = alice.encrypt_message("Hi Bob!", &bob_did).await.unwrap();

    // Sender copy and receiver copy both open.
    assert_eq!(alice.decrypt_message(&envelope).await.unwrap(), "Hi Bob!");
    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "Hi Bob!");

    // A third party cannot open it.
    let mut victor = open_wallet(&dir, "victor", &registry);
    victor.create_id("Victor", None).await.unwrap();
    assert!(matches!(
        victor.decrypt_message(&envelope).await,
        Err(Error::DecryptionFailed)
    ));
}

#[tokio::test]
async fn rotations_preserve_old_ciphertexts() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);
    let mut bob = open_wallet(&dir, "bob", &registry);

    alice.create_id("Alice", None).await.unwrap();
    let bob_did = bob.create_id("Bob", None).await.unwrap();

    // One envelope per rotation epoch.
    let mut envelopes = Vec::new();
    for round in 0u32..3 {
        envelopes.push(alice.encrypt_message("Hi Bob!", &bob_did).await.unwrap());
        alice.rotate_keys().await.unwrap();
        bob.rotate_keys().await.unwrap();
        assert_eq!(alice.wallet().ids["Alice"].index, round + 1);
    }

    for envelope in &envelopes {
        assert_eq!(alice.decrypt_message(envelope).await.unwrap(), "Hi Bob!");
        assert_eq!(bob.decrypt_message(envelope).await.unwrap(), "Hi Bob!");
    }
}

#[tokio::test]
async fn json_roundtrip_and_signatures() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);
    let mut bob = open_wallet(&dir, "bob", &registry);

    alice.create_id("Alice", None).await.unwrap();
    let bob_did = bob.create_id("Bob", None).await.unwrap();

    let value = json!({"n": 42, "nested": {"list": [1, 2, 3]}});
    let did = alice.encrypt_json(&value, &bob_did).await.unwrap();
    assert_eq!(bob.decrypt_json(&did).await.unwrap(), value);

    // Sign-then-verify holds; any mutation breaks it.
    let signed = alice.add_signature(&value).unwrap();
    assert!(alice.verify_signature(&signed).await);
    assert!(bob.verify_signature(&signed).await);

    let mut tampered = signed.clone();
    tampered["n"] = json!(43);
    assert!(!bob.verify_signature(&tampered).await);

    let mut bad_sig = signed.clone();
    bad_sig["signature"]["value"] = json!("00");
    assert!(!bob.verify_signature(&bad_sig).await);

    assert!(!bob.verify_signature(&value).await);
    assert!(!bob.verify_signature(&serde_json::Value::Null).await);
}

#[tokio::test]
async fn signatures_survive_signer_rotation() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);

    alice.create_id("Alice", None).await.unwrap();
    let signed = alice.add_signature(&json!({"claim": "pre-rotation"})).unwrap();

    alice.rotate_keys().await.unwrap();
    assert!(alice.verify_signature(&signed).await);
}

#[tokio::test]
async fn credential_pipeline_with_revocation() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);
    let mut bob = open_wallet(&dir, "bob", &registry);
    let mut victor = open_wallet(&dir, "victor", &registry);

    let alice_did = alice.create_id("Alice", None).await.unwrap();
    let bob_did = bob.create_id("Bob", None).await.unwrap();
    victor.create_id("Victor", None).await.unwrap();

    // Alice issues a credential to Bob over a schema.
    let schema = json!({
        "type": "object",
        "properties": { "email": { "type": "string" } },
    });
    let schema_did = alice.create_credential(&schema).await.unwrap();
    let bound = alice.bind_credential(&schema_did, &bob_did).await.unwrap();
    assert_eq!(bound["issuer"], json!(alice_did));
    assert_eq!(bound["credential"]["email"], json!(""));

    let attestation = alice.attest_credential(&bound).await.unwrap();
    assert!(bob.accept_credential(&attestation).await.unwrap());
    assert_eq!(bob.wallet().ids["Bob"].held, vec![attestation.clone()]);

    // Victor challenges Bob for that schema, attested by Alice.
    let challenge = Challenge {
        credentials: vec![CredentialRequest {
            schema: schema_did.clone(),
            attestors: vec![alice_did.clone()],
        }],
    };
    let challenge_did = victor.create_challenge(&challenge).await.unwrap();
    let bound_challenge = victor.issue_challenge(&challenge_did, &bob_did).await.unwrap();

    let response = bob.create_response(&bound_challenge).await.unwrap();
    let verified = victor.verify_response(&response).await.unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0]["issuer"], json!(alice_did));

    // After revocation the same response verifies to nothing.
    assert!(alice.revoke_credential(&attestation).await.unwrap());
    assert!(!alice.revoke_credential(&attestation).await.unwrap());
    let verified = victor.verify_response(&response).await.unwrap();
    assert!(verified.is_empty());
}

#[tokio::test]
async fn attest_requires_issuer_and_subject_must_match() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);
    let mut bob = open_wallet(&dir, "bob", &registry);
    let mut eve = open_wallet(&dir, "eve", &registry);

    alice.create_id("Alice", None).await.unwrap();
    let bob_did = bob.create_id("Bob", None).await.unwrap();
    eve.create_id("Eve", None).await.unwrap();

    let schema = json!({"type": "object", "properties": {"ok": {"type": "boolean"}}});
    let schema_did = alice.create_credential(&schema).await.unwrap();
    let bound = alice.bind_credential(&schema_did, &bob_did).await.unwrap();

    // Eve cannot attest Alice's bound credential.
    assert!(matches!(
        eve.attest_credential(&bound).await,
        Err(Error::InvalidVc)
    ));

    // Eve is not the subject, so accepting returns false.
    let attestation = alice.attest_credential(&bound).await.unwrap();
    assert!(!eve.accept_credential(&attestation).await.is_ok_and(|ok| ok));
}

#[tokio::test]
async fn wallet_backup_and_recovery() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut km = open_wallet(&dir, "w", &registry);

    km.create_id("Alice", None).await.unwrap();
    let mnemonic = km.decrypt_mnemonic().unwrap();
    let before = km.wallet().clone();

    let backup = km.backup_wallet().await.unwrap();

    // Wipe to a wallet over the same mnemonic, then recover.
    km.new_wallet(Some(&mnemonic)).unwrap();
    assert!(km.wallet().ids.is_empty());
    km.recover_wallet(&backup).await.unwrap();
    assert_eq!(km.wallet(), &before);
}

#[tokio::test]
async fn recover_id_needs_the_same_seed() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);

    let did = alice.create_id("Alice", None).await.unwrap();
    alice.backup_id().await.unwrap();
    let before = alice.wallet().ids["Alice"].clone();

    // Same seed: recovery rebuilds the identity.
    let mnemonic = alice.decrypt_mnemonic().unwrap();
    alice.new_wallet(Some(&mnemonic)).unwrap();
    let name = alice.recover_id(&did).await.unwrap();
    assert_eq!(name, "Alice");
    assert_eq!(alice.wallet().ids["Alice"], before);
    assert_eq!(alice.wallet().current, "Alice");

    // Different seed: the vault does not open.
    let mut stranger = open_wallet(&dir, "stranger", &registry);
    assert!(matches!(
        stranger.recover_id(&did).await,
        Err(Error::CannotRecoverId)
    ));
}

#[tokio::test]
async fn identity_bookkeeping_invariants() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut km = open_wallet(&dir, "w", &registry);

    km.create_id("a", None).await.unwrap();
    km.create_id("b", None).await.unwrap();
    km.create_id("c", None).await.unwrap();

    // Every account is below the counter.
    for id in km.wallet().ids.values() {
        assert!(id.account < km.wallet().counter);
    }

    // use / remove / current transitions.
    km.use_id("a").unwrap();
    assert!(matches!(km.use_id("nope"), Err(Error::NoSuchId(_))));
    km.remove_id("a").unwrap();
    assert!(km.wallet().current.is_empty());
    assert!(matches!(km.remove_id("a"), Err(Error::NoSuchId(_))));

    let ids = km.list_ids();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|(_, current)| !current));

    // Aliases share the identity namespace, and removal is idempotent.
    km.add_name("site", "did:mdip:somewhere").unwrap();
    assert!(matches!(km.add_name("b", "did:mdip:x"), Err(Error::NameInUse)));
    assert!(matches!(
        km.create_id("site", None).await,
        Err(Error::NameTaken(_))
    ));
    assert_eq!(km.lookup_did("site").unwrap(), "did:mdip:somewhere");
    assert!(km.remove_name("site").unwrap());
    assert!(km.remove_name("site").unwrap());
}

#[tokio::test]
async fn no_current_id_errors() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut km = open_wallet(&dir, "w", &registry);

    let err = km.encrypt_message("hi", "did:mdip:x").await.unwrap_err();
    assert_eq!(err.to_string(), "No current ID");
    assert!(matches!(km.rotate_keys().await, Err(Error::NoCurrentId)));
    assert!(matches!(km.backup_id().await, Err(Error::NoCurrentId)));
    assert!(matches!(
        km.add_signature(&json!({"x": 1})),
        Err(Error::NoCurrentId)
    ));
}

#[tokio::test]
async fn publish_and_unpublish_credential() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let mut alice = open_wallet(&dir, "alice", &registry);
    let mut bob = open_wallet(&dir, "bob", &registry);

    alice.create_id("Alice", None).await.unwrap();
    let bob_did = bob.create_id("Bob", None).await.unwrap();

    let schema = json!({"type": "object", "properties": {"email": {"type": "string"}}});
    let schema_did = alice.create_credential(&schema).await.unwrap();
    let bound = alice.bind_credential(&schema_did, &bob_did).await.unwrap();
    let attestation = alice.attest_credential(&bound).await.unwrap();
    assert!(bob.accept_credential(&attestation).await.unwrap());

    // Redacted publication hides the credential body.
    let published = bob.publish_credential(&attestation, false).await.unwrap();
    assert!(published["credential"].is_null());

    let doc = bob.resolve_did(&bob_did).await.unwrap();
    let manifest = doc.did_document_metadata.manifest.unwrap();
    assert!(manifest.contains_key(&attestation));

    // Full publication reveals it; unpublish clears the manifest entry.
    let published = bob.publish_credential(&attestation, true).await.unwrap();
    assert_eq!(published["credential"]["email"], json!(""));

    bob.unpublish_credential(&attestation).await.unwrap();
    let doc = bob.resolve_did(&bob_did).await.unwrap();
    let manifest = doc.did_document_metadata.manifest.unwrap_or_default();
    assert!(!manifest.contains_key(&attestation));

    assert!(matches!(
        bob.unpublish_credential(&attestation).await,
        Err(Error::InvalidInput)
    ));
}
