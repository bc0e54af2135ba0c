//! secp256r1 ECDSA keys, points and signature helpers.

use crate::error::{CryptoError, CryptoResult};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::cmp::Ordering;
use std::fmt;

/// A validated point on secp256r1 in compressed SEC1 form.
///
/// Committee members, consensus validators and signature checks all
/// identify keys by this 33-byte encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ECPoint {
    encoded: [u8; 33],
}

impl ECPoint {
    /// Decodes a compressed or uncompressed SEC1 point, normalizing to the
    /// compressed form.
    pub fn decode(bytes: &[u8]) -> CryptoResult<Self> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::invalid_point(e.to_string()))?;
        let compressed = key.to_encoded_point(true);
        let mut encoded = [0u8; 33];
        encoded.copy_from_slice(compressed.as_bytes());
        Ok(Self { encoded })
    }

    /// Decodes a point from its hex representation.
    pub fn from_hex(hex_str: &str) -> CryptoResult<Self> {
        let bytes =
            hex::decode(hex_str).map_err(|e| CryptoError::invalid_point(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// The compressed SEC1 encoding.
    pub fn encoded(&self) -> &[u8; 33] {
        &self.encoded
    }

    /// The compressed encoding as a vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encoded.to_vec()
    }

    fn verifying_key(&self) -> VerifyingKey {
        // Construction is validated in `decode`.
        VerifyingKey::from_sec1_bytes(&self.encoded).expect("point was validated on decode")
    }
}

impl fmt::Display for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.encoded))
    }
}

impl fmt::Debug for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ECPoint({})", hex::encode(self.encoded))
    }
}

impl PartialOrd for ECPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ECPoint {
    /// Points order by X coordinate, then by the parity byte, giving the
    /// canonical committee ordering.
    fn cmp(&self, other: &Self) -> Ordering {
        self.encoded[1..]
            .cmp(&other.encoded[1..])
            .then(self.encoded[0].cmp(&other.encoded[0]))
    }
}

/// A secp256r1 private/public key pair.
pub struct KeyPair {
    signing_key: SigningKey,
    public_key: ECPoint,
}

impl KeyPair {
    /// Creates a key pair from 32 private-key bytes.
    pub fn from_private_key(bytes: &[u8]) -> CryptoResult<Self> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public_key = ECPoint::decode(
            VerifyingKey::from(&signing_key)
                .to_encoded_point(true)
                .as_bytes(),
        )?;
        Ok(Self {
            signing_key,
            public_key,
        })
    }

    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let public_key = ECPoint::decode(
            VerifyingKey::from(&signing_key)
                .to_encoded_point(true)
                .as_bytes(),
        )
        .expect("generated key is a valid point");
        Self {
            signing_key,
            public_key,
        }
    }

    /// The public half of the pair.
    pub fn public_key(&self) -> &ECPoint {
        &self.public_key
    }

    /// Signs `message`, returning the 64-byte `r ‖ s` signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_bytes().to_vec()
    }
}

/// Signs `message` with a raw 32-byte private key.
pub fn sign(message: &[u8], private_key: &[u8]) -> CryptoResult<Vec<u8>> {
    Ok(KeyPair::from_private_key(private_key)?.sign(message))
}

/// Verifies a 64-byte `r ‖ s` signature. Malformed keys or signatures
/// verify as `false`; verification never errors.
pub fn verify_signature(message: &[u8], signature: &[u8], public_key: &ECPoint) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    public_key
        .verifying_key()
        .verify(message, &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let pair = KeyPair::generate();
        let message = b"block header bytes";
        let signature = pair.sign(message);
        assert!(verify_signature(message, &signature, pair.public_key()));
        assert!(!verify_signature(b"other message", &signature, pair.public_key()));
    }

    #[test]
    fn tampered_signature_fails() {
        let pair = KeyPair::generate();
        let mut signature = pair.sign(b"payload");
        signature[10] ^= 0xFF;
        assert!(!verify_signature(b"payload", &signature, pair.public_key()));
    }

    #[test]
    fn short_signature_is_false_not_error() {
        let pair = KeyPair::generate();
        assert!(!verify_signature(b"payload", &[0u8; 10], pair.public_key()));
    }

    #[test]
    fn decode_rejects_junk() {
        assert!(ECPoint::decode(&[0u8; 33]).is_err());
        assert!(ECPoint::decode(&[]).is_err());
    }

    #[test]
    fn ordering_is_total_and_stable() {
        let mut points: Vec<ECPoint> = (0..4).map(|_| *KeyPair::generate().public_key()).collect();
        points.sort();
        let mut again = points.clone();
        again.sort();
        assert_eq!(points, again);
    }
}
