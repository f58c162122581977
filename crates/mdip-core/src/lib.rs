//! # mdip-core
//!
//! Core primitives for the MDIP keymaster.
//!
//! This crate provides:
//! - BIP-39 mnemonics and BIP-32/44 key derivation over secp256k1
//! - JWK key representation
//! - JCS canonicalization, hashing, and ECDSA signing
//! - ECDH + AES-GCM message sealing
//! - DID minting and parsing
//! - DID document and registry operation types
//!
//! Everything here is pure: no I/O, no registry, no wallet state.

pub mod cipher;
pub mod did;
pub mod document;
pub mod error;
pub mod hd;
pub mod jwk;
pub mod operation;
pub mod signing;

pub use did::Did;
pub use document::{DidDocument, DocumentMetadata, MdipDocument, VerificationMethod};
pub use error::Error;
pub use jwk::{EcJwk, Keypair};
pub use operation::{
    EntityKind, MdipMeta, OpSignature, Operation, OperationType, DEFAULT_REGISTRY, MDIP_VERSION,
};

/// Result type for mdip-core operations.
pub type Result<T> = std::result::Result<T, Error>;
