//! Asymmetric message sealing: ECDH + HKDF-SHA256 + AES-256-GCM.
//!
//! The raw Diffie-Hellman output is never used as a key directly; it is
//! expanded through HKDF with a domain-separation label first. The sealed
//! wire form is `base64(nonce || ciphertext)` with a fresh random 96-bit
//! nonce per message, the only format `open` accepts.

use crate::{EcJwk, Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

/// Domain separation label for message keys. Changing it silently derives
/// different keys from the same shared secret, making old ciphertexts
/// unreadable.
const CIPHER_DOMAIN: &[u8] = b"mdip/cipher/v1";

const NONCE_LENGTH: usize = 12;

/// Encrypt a plaintext so that the holder of `private_jwk`'s counterpart
/// and the holder of `public_jwk`'s counterpart derive the same key.
///
/// Encrypting to your own public key is valid and used for the
/// sender-readable copy of an envelope.
pub fn encrypt_message(public_jwk: &EcJwk, private_jwk: &EcJwk, plaintext: &str) -> Result<String> {
    let key = shared_key(public_jwk, private_jwk)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| Error::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| Error::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Decrypt a message previously sealed with [`encrypt_message`].
///
/// Fails with `DecryptionFailed` on a MAC mismatch, a wrong key, or
/// malformed input. The cases are deliberately indistinguishable.
pub fn decrypt_message(public_jwk: &EcJwk, private_jwk: &EcJwk, ciphertext: &str) -> Result<String> {
    let data = BASE64
        .decode(ciphertext)
        .map_err(|_| Error::DecryptionFailed)?;
    if data.len() < NONCE_LENGTH {
        return Err(Error::DecryptionFailed);
    }

    let key = shared_key(public_jwk, private_jwk)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| Error::DecryptionFailed)?;

    let (nonce_bytes, sealed) = data.split_at(NONCE_LENGTH);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| Error::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
}

/// ECDH shared point expanded to an AES-256 key.
fn shared_key(public_jwk: &EcJwk, private_jwk: &EcJwk) -> Result<[u8; 32]> {
    let public = public_jwk.to_public_key()?;
    let secret = private_jwk.to_secret_key()?;

    let shared =
        k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());

    let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
    let mut key = [0u8; 32];
    hk.expand(CIPHER_DOMAIN, &mut key)
        .map_err(|_| Error::EncryptionFailed)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypair;
    use k256::SecretKey;
    use rand::rngs::OsRng;

    fn keypair() -> Keypair {
        Keypair::from_secret_key(&SecretKey::random(&mut OsRng))
    }

    #[test]
    fn test_roundtrip_between_parties() {
        let alice = keypair();
        let bob = keypair();

        let sealed = encrypt_message(&bob.public_jwk, &alice.private_jwk, "Hi Bob!").unwrap();
        let opened = decrypt_message(&alice.public_jwk, &bob.private_jwk, &sealed).unwrap();
        assert_eq!(opened, "Hi Bob!");
    }

    #[test]
    fn test_roundtrip_to_self() {
        let alice = keypair();

        let sealed = encrypt_message(&alice.public_jwk, &alice.private_jwk, "note").unwrap();
        let opened = decrypt_message(&alice.public_jwk, &alice.private_jwk, &sealed).unwrap();
        assert_eq!(opened, "note");
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = keypair();
        let bob = keypair();
        let eve = keypair();

        let sealed = encrypt_message(&bob.public_jwk, &alice.private_jwk, "secret").unwrap();
        assert!(decrypt_message(&alice.public_jwk, &eve.private_jwk, &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let alice = keypair();
        let bob = keypair();

        let sealed = encrypt_message(&bob.public_jwk, &alice.private_jwk, "secret").unwrap();
        let mut data = BASE64.decode(&sealed).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        let tampered = BASE64.encode(data);

        assert!(decrypt_message(&alice.public_jwk, &bob.private_jwk, &tampered).is_err());
    }

    #[test]
    fn test_unique_nonces() {
        let alice = keypair();
        let bob = keypair();

        let a = encrypt_message(&bob.public_jwk, &alice.private_jwk, "same").unwrap();
        let b = encrypt_message(&bob.public_jwk, &alice.private_jwk, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_input_fails() {
        let alice = keypair();
        assert!(decrypt_message(&alice.public_jwk, &alice.private_jwk, "!!!").is_err());
        assert!(decrypt_message(&alice.public_jwk, &alice.private_jwk, "AAAA").is_err());
    }
}
