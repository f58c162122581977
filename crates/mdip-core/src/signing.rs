//! JCS canonicalization, hashing, and ECDSA signing.
//!
//! Every structured object is canonicalized (RFC 8785) before it is hashed
//! or signed, so the same logical document always produces the same digest
//! regardless of key order or whitespace.

use crate::{EcJwk, Error, Result};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Canonicalize a JSON value using JCS (RFC 8785).
///
/// Sorted keys, no insignificant whitespace, minimal string escapes. This
/// produces a deterministic byte representation suitable for signing.
pub fn canonicalize(value: &serde_json::Value) -> String {
    serialize_canonical(value)
}

/// Lowercase hex SHA-256 over a UTF-8 string.
pub fn hash_message(message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical form of a JSON value.
pub fn hash_json(value: &serde_json::Value) -> String {
    hash_message(&canonicalize(value))
}

/// Sign a hex-encoded SHA-256 digest with a private JWK.
///
/// Returns the compact (r || s) ECDSA signature as lowercase hex.
pub fn sign_hash(hash_hex: &str, private_jwk: &EcJwk) -> Result<String> {
    let digest = decode_digest(hash_hex)?;
    let signing_key = SigningKey::from(&private_jwk.to_secret_key()?);
    let signature: Signature = signing_key
        .sign_prehash(&digest)
        .map_err(|_| Error::InvalidKey("signing failed".into()))?;
    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a hex signature over a hex digest against a public JWK.
///
/// Malformed input verifies as `false`, never as an error.
pub fn verify_sig(hash_hex: &str, sig_hex: &str, public_jwk: &EcJwk) -> bool {
    let Ok(digest) = decode_digest(hash_hex) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    let Ok(public_key) = public_jwk.to_public_key() else {
        return false;
    };

    VerifyingKey::from(&public_key)
        .verify_prehash(&digest, &signature)
        .is_ok()
}

fn decode_digest(hash_hex: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hash_hex).map_err(|_| Error::InvalidKey("invalid digest hex".into()))?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidKey("digest must be 32 bytes".into()))
}

/// Serialize a JSON value in canonical form (sorted keys, no whitespace).
fn serialize_canonical(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(serialize_canonical).collect();
            format!("[{}]", items.join(","))
        }
        serde_json::Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let pairs: Vec<String> = keys
                .iter()
                .map(|k| {
                    format!(
                        "\"{}\":{}",
                        escape_json_string(k),
                        serialize_canonical(&obj[*k])
                    )
                })
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
    }
}

/// Escape special characters in JSON strings.
fn escape_json_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypair;
    use k256::SecretKey;
    use rand::rngs::OsRng;
    use serde_json::json;

    fn keypair() -> Keypair {
        Keypair::from_secret_key(&SecretKey::random(&mut OsRng))
    }

    #[test]
    fn test_canonical_order() {
        let value = json!({"b": 2, "a": 1});
        assert_eq!(canonicalize(&value), "{\"a\":1,\"b\":2}");
    }

    #[test]
    fn test_nested_canonical() {
        let value = json!({"z": {"b": 2, "a": 1}, "a": []});
        assert_eq!(canonicalize(&value), "{\"a\":[],\"z\":{\"a\":1,\"b\":2}}");
    }

    #[test]
    fn test_hash_deterministic() {
        let value = json!({"hello": "world"});
        assert_eq!(hash_json(&value), hash_json(&value));
    }

    #[test]
    fn test_hash_message_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hash_message("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = keypair();
        let hash = hash_message("a message");

        let sig = sign_hash(&hash, &kp.private_jwk).unwrap();
        assert!(verify_sig(&hash, &sig, &kp.public_jwk));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let kp = keypair();
        let other = keypair();
        let hash = hash_message("a message");

        let sig = sign_hash(&hash, &kp.private_jwk).unwrap();
        assert!(!verify_sig(&hash, &sig, &other.public_jwk));
    }

    #[test]
    fn test_tampered_hash_fails_verification() {
        let kp = keypair();
        let sig = sign_hash(&hash_message("original"), &kp.private_jwk).unwrap();
        assert!(!verify_sig(&hash_message("tampered"), &sig, &kp.public_jwk));
    }

    #[test]
    fn test_malformed_input_is_false_not_error() {
        let kp = keypair();
        assert!(!verify_sig("zz", "zz", &kp.public_jwk));
        assert!(!verify_sig(&hash_message("x"), "deadbeef", &kp.public_jwk));
    }
}
