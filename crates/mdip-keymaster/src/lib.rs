//! # mdip-keymaster
//!
//! Identity manager and credential engine for the MDIP wallet.
//!
//! This crate provides:
//! - The persistent wallet: seed, derivation state, names, held credentials
//! - Identity lifecycle: create, rotate, backup, recover
//! - Sealed messaging between DIDs with historical decryptability
//! - The verifiable-credential pipeline and challenge/response protocol
//!
//! Cryptography lives in `mdip-core`; registry access goes through the
//! `Gatekeeper` trait from `mdip-gatekeeper`.

pub mod credential;
pub mod error;
pub mod keymaster;
pub mod wallet;

pub use credential::{
    BoundChallenge, Challenge, ChallengeResponse, CredentialPresentation, CredentialRequest,
};
pub use error::Error;
pub use keymaster::{AssetData, Envelope, Keymaster};
pub use wallet::{HdKey, Identity, Seed, Wallet, WalletStore};

/// Result type for mdip-keymaster operations.
pub type Result<T> = std::result::Result<T, Error>;
