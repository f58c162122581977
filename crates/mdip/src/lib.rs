//! # MDIP
//!
//! Self-sovereign identity wallet and credential engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdip::{Keymaster, MemoryGatekeeper, WalletStore};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = WalletStore::new("wallet.json");
//! let mut keymaster = Keymaster::new(store, MemoryGatekeeper::new())?;
//!
//! let did = keymaster.create_id("Alice", None).await?;
//! println!("DID: {}", did);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Cipher primitives, DIDs, documents, operations
//! - [`gatekeeper`] - Registry client seam and implementations
//! - [`keymaster`] - Wallet, identities, credentials, messaging
//!
//! ## Re-exports
//!
//! Common types are re-exported at the crate root for convenience.

pub use mdip_core as core;
pub use mdip_gatekeeper as gatekeeper;
pub use mdip_keymaster as keymaster;

// Re-export common types at root
pub use mdip_core::{Did, EcJwk, Keypair, MdipDocument, Operation};
pub use mdip_gatekeeper::{Gatekeeper, HttpGatekeeper, MemoryGatekeeper};
pub use mdip_keymaster::{
    Challenge, CredentialRequest, Error, Keymaster, Wallet, WalletStore,
};
