//! Gatekeeper registry client for the MDIP keymaster.
//!
//! The gatekeeper stores the linear operation history behind every DID.
//! This crate defines the client seam ([`Gatekeeper`]), an HTTP client for
//! a remote gatekeeper, and an in-memory reference registry that enforces
//! the same rules in-process (used by tests and the reference service).

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdip_core::{Error as CoreError, MdipDocument, Operation};
use thiserror::Error;

/// Registries a gatekeeper will anchor to.
pub const KNOWN_REGISTRIES: &[&str] = &["local", "peerbit", "BTC", "tBTC"];

#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error("DID not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry unavailable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;

/// The four operations the core requires of a registry.
///
/// `resolve_did` is read-only and idempotent. Create/update/delete are
/// at-most-once from the client's perspective; the registry deduplicates
/// by operation hash.
#[async_trait]
pub trait Gatekeeper: Send + Sync {
    /// Submit a signed create operation; returns the canonical DID.
    async fn create_did(&self, operation: &Operation) -> Result<String>;

    /// Resolve a DID to its current document.
    async fn resolve_did(&self, did: &str) -> Result<MdipDocument> {
        self.resolve_did_at(did, None).await
    }

    /// Resolve a DID as of a point in time (`None` means now).
    ///
    /// Historical resolution is what keeps pre-rotation ciphertexts
    /// decryptable and pre-rotation signatures verifiable: the caller asks
    /// for the key that was in force when the artifact was made.
    async fn resolve_did_at(
        &self,
        did: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<MdipDocument>;

    /// Append a signed update operation. Returns false when the operation
    /// was already applied (deduplicated by hash).
    async fn update_did(&self, operation: &Operation) -> Result<bool>;

    /// Append a signed deactivate operation. Returns false when the DID
    /// was already deactivated.
    async fn delete_did(&self, operation: &Operation) -> Result<bool>;
}

// Shared registries (several wallets over one in-process gatekeeper)
// just clone an Arc.
#[async_trait]
impl<G: Gatekeeper + ?Sized> Gatekeeper for std::sync::Arc<G> {
    async fn create_did(&self, operation: &Operation) -> Result<String> {
        (**self).create_did(operation).await
    }

    async fn resolve_did_at(
        &self,
        did: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<MdipDocument> {
        (**self).resolve_did_at(did, at).await
    }

    async fn update_did(&self, operation: &Operation) -> Result<bool> {
        (**self).update_did(operation).await
    }

    async fn delete_did(&self, operation: &Operation) -> Result<bool> {
        (**self).delete_did(operation).await
    }
}

pub use http::HttpGatekeeper;
pub use memory::MemoryGatekeeper;
