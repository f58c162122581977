//! JSON Web Key representation of secp256k1 keys.
//!
//! Keys cross the wire (and the wallet file) as JWKs with base64url
//! coordinates; everything else in the crate converts to and from the
//! `k256` types at the boundary.

use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

/// An elliptic-curve JWK (RFC 7517), restricted to secp256k1.
///
/// `d` is present only for private keys. Cloning a public JWK is safe to
/// share; a JWK with `d` set is secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    /// Key type, always "EC".
    pub kty: String,
    /// Curve name, always "secp256k1".
    pub crv: String,
    /// Affine x coordinate, base64url without padding.
    pub x: String,
    /// Affine y coordinate, base64url without padding.
    pub y: String,
    /// Private scalar, base64url without padding. Absent on public keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

/// A derived keypair, both halves as JWKs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypair {
    pub private_jwk: EcJwk,
    pub public_jwk: EcJwk,
}

impl EcJwk {
    /// Build a public JWK from a k256 public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(false);
        Self {
            kty: "EC".to_string(),
            crv: "secp256k1".to_string(),
            x: URL_SAFE_NO_PAD.encode(point.x().expect("uncompressed point")),
            y: URL_SAFE_NO_PAD.encode(point.y().expect("uncompressed point")),
            d: None,
        }
    }

    /// Build a private JWK from a k256 secret key.
    pub fn from_secret_key(key: &SecretKey) -> Self {
        let mut jwk = Self::from_public_key(&key.public_key());
        jwk.d = Some(URL_SAFE_NO_PAD.encode(key.to_bytes()));
        jwk
    }

    /// Strip the private scalar, leaving a shareable public JWK.
    pub fn to_public(&self) -> Self {
        Self {
            d: None,
            ..self.clone()
        }
    }

    /// Recover the k256 public key from the x/y coordinates.
    pub fn to_public_key(&self) -> Result<PublicKey> {
        self.check_curve()?;
        let x = URL_SAFE_NO_PAD
            .decode(&self.x)
            .map_err(|e| Error::InvalidKey(format!("invalid x coordinate: {}", e)))?;
        let y = URL_SAFE_NO_PAD
            .decode(&self.y)
            .map_err(|e| Error::InvalidKey(format!("invalid y coordinate: {}", e)))?;
        if x.len() != 32 || y.len() != 32 {
            return Err(Error::InvalidKey("coordinates must be 32 bytes".into()));
        }

        // Rebuild the uncompressed SEC1 encoding: 0x04 || x || y
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| Error::InvalidKey("point is not on secp256k1".into()))
    }

    /// Recover the k256 secret key. Fails if `d` is absent.
    pub fn to_secret_key(&self) -> Result<SecretKey> {
        self.check_curve()?;
        let d = self
            .d
            .as_ref()
            .ok_or_else(|| Error::InvalidKey("missing private scalar".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|e| Error::InvalidKey(format!("invalid private scalar: {}", e)))?;
        SecretKey::from_slice(&bytes)
            .map_err(|_| Error::InvalidKey("scalar is not a valid secp256k1 key".into()))
    }

    fn check_curve(&self) -> Result<()> {
        if self.kty != "EC" || self.crv != "secp256k1" {
            return Err(Error::InvalidKey(format!(
                "unsupported key type {}/{}",
                self.kty, self.crv
            )));
        }
        Ok(())
    }
}

impl Keypair {
    /// Build a keypair from a k256 secret key.
    pub fn from_secret_key(key: &SecretKey) -> Self {
        Self {
            private_jwk: EcJwk::from_secret_key(key),
            public_jwk: EcJwk::from_public_key(&key.public_key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_jwk_roundtrip() {
        let secret = SecretKey::random(&mut OsRng);
        let jwk = EcJwk::from_secret_key(&secret);

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv, "secp256k1");
        assert!(jwk.d.is_some());

        let recovered = jwk.to_secret_key().unwrap();
        assert_eq!(secret.to_bytes(), recovered.to_bytes());

        let public = jwk.to_public_key().unwrap();
        assert_eq!(public, secret.public_key());
    }

    #[test]
    fn test_public_jwk_has_no_scalar() {
        let secret = SecretKey::random(&mut OsRng);
        let public = EcJwk::from_secret_key(&secret).to_public();

        assert!(public.d.is_none());
        assert!(public.to_secret_key().is_err());
        assert!(public.to_public_key().is_ok());
    }

    #[test]
    fn test_rejects_wrong_curve() {
        let secret = SecretKey::random(&mut OsRng);
        let mut jwk = EcJwk::from_public_key(&secret.public_key());
        jwk.crv = "P-256".to_string();

        assert!(jwk.to_public_key().is_err());
    }

    #[test]
    fn test_jwk_serde_shape() {
        let secret = SecretKey::random(&mut OsRng);
        let jwk = EcJwk::from_public_key(&secret.public_key());
        let json = serde_json::to_value(&jwk).unwrap();

        assert_eq!(json["kty"], "EC");
        assert_eq!(json["crv"], "secp256k1");
        assert!(json.get("d").is_none());
    }
}
