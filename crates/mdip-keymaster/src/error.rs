//! Error types for mdip-keymaster.
//!
//! Display strings are part of the CLI contract; changing them breaks
//! scripts that match on command output.

use mdip_gatekeeper::GatekeeperError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No current ID")]
    NoCurrentId,

    #[error("Already have an ID named {0}")]
    NameTaken(String),

    #[error("Name already in use")]
    NameInUse,

    #[error("No ID named {0}")]
    NoSuchId(String),

    #[error("Invalid input")]
    InvalidInput,

    #[error("Invalid VC")]
    InvalidVc,

    #[error("Cannot recover wallet")]
    CannotRecover,

    #[error("Cannot recover ID")]
    CannotRecoverId,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Tampered ciphertext")]
    TamperedCiphertext,

    #[error(transparent)]
    Core(#[from] mdip_core::Error),

    #[error(transparent)]
    Gatekeeper(#[from] GatekeeperError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Wallet I/O error: {0}")]
    Io(#[from] std::io::Error),
}
