//! Base58Check encoding for addresses and WIF keys.

use crate::error::{CryptoError, CryptoResult};
use crate::hash::hash256;

/// Encodes `data` with a 4-byte double-SHA-256 checksum appended.
pub fn base58check_encode(data: &[u8]) -> String {
    let checksum = hash256(data);
    let mut payload = Vec::with_capacity(data.len() + 4);
    payload.extend_from_slice(data);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

/// Decodes a Base58Check string, verifying and stripping the checksum.
pub fn base58check_decode(encoded: &str) -> CryptoResult<Vec<u8>> {
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CryptoError::invalid_base58(e.to_string()))?;
    if decoded.len() < 4 {
        return Err(CryptoError::invalid_base58("payload shorter than checksum"));
    }
    let (data, checksum) = decoded.split_at(decoded.len() - 4);
    let expected = hash256(data);
    if checksum != &expected[..4] {
        return Err(CryptoError::invalid_base58("checksum mismatch"));
    }
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_corrupted_checksum() {
        let mut encoded = base58check_encode(b"\x35neo3-address-payload").into_bytes();
        let last = encoded.len() - 1;
        encoded[last] = if encoded[last] == b'1' { b'2' } else { b'1' };
        assert!(base58check_decode(std::str::from_utf8(&encoded).unwrap()).is_err());
    }

    proptest! {
        #[test]
        fn round_trip(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let encoded = base58check_encode(&data);
            prop_assert_eq!(base58check_decode(&encoded).unwrap(), data);
        }
    }
}
