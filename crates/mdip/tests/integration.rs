//! Integration tests for the public MDIP API.

use mdip::{Keymaster, MemoryGatekeeper, WalletStore};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_full_identity_flow() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());

    let store = WalletStore::new(dir.path().join("wallet.json"));
    let mut keymaster = Keymaster::new(store, Arc::clone(&registry)).unwrap();

    // Create an identity and resolve its document.
    let did = keymaster.create_id("Alice", None).await.unwrap();
    assert!(did.starts_with("did:mdip:"));

    let doc = keymaster.resolve_did("Alice").await.unwrap();
    assert_eq!(doc.did_document.id, did);
    assert!(doc.public_key_jwk().is_some());

    // The DID string parses back into the typed form.
    let parsed: mdip::Did = did.parse().unwrap();
    assert_eq!(parsed.to_string(), did);
}

#[tokio::test]
async fn test_identities_are_unique() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());

    let store = WalletStore::new(dir.path().join("wallet.json"));
    let mut keymaster = Keymaster::new(store, Arc::clone(&registry)).unwrap();

    let mut dids = Vec::new();
    for i in 0..5 {
        dids.push(keymaster.create_id(&format!("id-{}", i), None).await.unwrap());
    }

    for (i, a) in dids.iter().enumerate() {
        for (j, b) in dids.iter().enumerate() {
            if i != j {
                assert_ne!(a, b, "DIDs should be unique");
            }
        }
    }
}

#[tokio::test]
async fn test_wallet_reopens_from_disk() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(MemoryGatekeeper::new());
    let path = dir.path().join("wallet.json");

    let did = {
        let mut keymaster =
            Keymaster::new(WalletStore::new(&path), Arc::clone(&registry)).unwrap();
        keymaster.create_id("Alice", None).await.unwrap()
    };

    // A new process over the same file sees the same identity and can
    // still open envelopes addressed to it.
    let mut keymaster = Keymaster::new(WalletStore::new(&path), Arc::clone(&registry)).unwrap();
    assert_eq!(keymaster.wallet().ids["Alice"].did, did);

    let envelope = keymaster.encrypt_message("note to self", &did).await.unwrap();
    assert_eq!(
        keymaster.decrypt_message(&envelope).await.unwrap(),
        "note to self"
    );
}
