//! BLS12-381 group operations exposed by the CryptoLib native contract.

use crate::error::{CryptoError, CryptoResult};
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar};
use group::Group;

/// Compressed G1 encoding length.
const G1_COMPRESSED: usize = 48;
/// Compressed G2 encoding length.
const G2_COMPRESSED: usize = 96;

/// A point in one of the BLS12-381 groups.
///
/// `Gt` elements only arise from pairings during a single contract
/// execution; they have no compressed wire encoding and cannot be
/// serialized back out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlsPoint {
    G1(G1Projective),
    G2(G2Projective),
    Gt(Gt),
}

/// Decodes a compressed G1 (48-byte) or G2 (96-byte) point.
pub fn bls12_381_deserialize(bytes: &[u8]) -> CryptoResult<BlsPoint> {
    match bytes.len() {
        G1_COMPRESSED => {
            let array: [u8; G1_COMPRESSED] = bytes.try_into().expect("length checked");
            let point = G1Affine::from_compressed(&array);
            if point.is_some().into() {
                Ok(BlsPoint::G1(G1Projective::from(point.unwrap())))
            } else {
                Err(CryptoError::invalid_point("invalid compressed G1 point"))
            }
        }
        G2_COMPRESSED => {
            let array: [u8; G2_COMPRESSED] = bytes.try_into().expect("length checked");
            let point = G2Affine::from_compressed(&array);
            if point.is_some().into() {
                Ok(BlsPoint::G2(G2Projective::from(point.unwrap())))
            } else {
                Err(CryptoError::invalid_point("invalid compressed G2 point"))
            }
        }
        other => Err(CryptoError::invalid_point(format!(
            "unsupported point length {other}"
        ))),
    }
}

/// Encodes a G1 or G2 point in compressed form.
pub fn bls12_381_serialize(point: &BlsPoint) -> CryptoResult<Vec<u8>> {
    match point {
        BlsPoint::G1(p) => Ok(G1Affine::from(p).to_compressed().to_vec()),
        BlsPoint::G2(p) => Ok(G2Affine::from(p).to_compressed().to_vec()),
        BlsPoint::Gt(_) => Err(CryptoError::invalid_point(
            "Gt elements have no wire encoding",
        )),
    }
}

/// Adds two points of the same group.
pub fn bls12_381_add(a: &BlsPoint, b: &BlsPoint) -> CryptoResult<BlsPoint> {
    match (a, b) {
        (BlsPoint::G1(x), BlsPoint::G1(y)) => Ok(BlsPoint::G1(x + y)),
        (BlsPoint::G2(x), BlsPoint::G2(y)) => Ok(BlsPoint::G2(x + y)),
        (BlsPoint::Gt(x), BlsPoint::Gt(y)) => Ok(BlsPoint::Gt(x + y)),
        _ => Err(CryptoError::invalid_point("mismatched point groups")),
    }
}

/// Multiplies a point by a little-endian 32-byte scalar, optionally negated.
pub fn bls12_381_mul(point: &BlsPoint, scalar_le: &[u8], negate: bool) -> CryptoResult<BlsPoint> {
    if scalar_le.len() != 32 {
        return Err(CryptoError::invalid_point("scalar must be 32 bytes"));
    }
    let array: [u8; 32] = scalar_le.try_into().expect("length checked");
    let scalar = Scalar::from_bytes(&array);
    if scalar.is_none().into() {
        return Err(CryptoError::invalid_point("scalar is not in the field"));
    }
    let mut scalar = scalar.unwrap();
    if negate {
        scalar = -scalar;
    }
    Ok(match point {
        BlsPoint::G1(p) => BlsPoint::G1(p * scalar),
        BlsPoint::G2(p) => BlsPoint::G2(p * scalar),
        BlsPoint::Gt(p) => BlsPoint::Gt(p * scalar),
    })
}

/// Computes the pairing `e(g1, g2)`.
pub fn bls12_381_pairing(g1: &BlsPoint, g2: &BlsPoint) -> CryptoResult<BlsPoint> {
    match (g1, g2) {
        (BlsPoint::G1(a), BlsPoint::G2(b)) => Ok(BlsPoint::Gt(bls12_381::pairing(
            &G1Affine::from(a),
            &G2Affine::from(b),
        ))),
        _ => Err(CryptoError::invalid_point(
            "pairing requires a G1 and a G2 point",
        )),
    }
}

/// The G1 generator, used by tests and by scalar-base operations.
pub fn g1_generator() -> BlsPoint {
    BlsPoint::G1(G1Projective::generator())
}

/// The G2 generator.
pub fn g2_generator() -> BlsPoint {
    BlsPoint::G2(G2Projective::generator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn g1_round_trip() {
        let point = g1_generator();
        let bytes = bls12_381_serialize(&point).unwrap();
        assert_eq!(bytes.len(), G1_COMPRESSED);
        assert_eq!(bls12_381_deserialize(&bytes).unwrap(), point);
    }

    #[test]
    fn g2_round_trip() {
        let point = g2_generator();
        let bytes = bls12_381_serialize(&point).unwrap();
        assert_eq!(bytes.len(), G2_COMPRESSED);
        assert_eq!(bls12_381_deserialize(&bytes).unwrap(), point);
    }

    #[test]
    fn add_is_doubling_for_equal_points() {
        let g = g1_generator();
        let two = vec![2u8]
            .into_iter()
            .chain(std::iter::repeat(0u8).take(31))
            .collect::<Vec<_>>();
        let doubled = bls12_381_mul(&g, &two, false).unwrap();
        assert_eq!(bls12_381_add(&g, &g).unwrap(), doubled);
    }

    #[test]
    fn pairing_is_bilinear_in_scalars() {
        let mut two = [0u8; 32];
        two[0] = 2;
        let g1 = g1_generator();
        let g2 = g2_generator();
        // e(2*G1, G2) == e(G1, 2*G2)
        let left = bls12_381_pairing(&bls12_381_mul(&g1, &two, false).unwrap(), &g2).unwrap();
        let right = bls12_381_pairing(&g1, &bls12_381_mul(&g2, &two, false).unwrap()).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn mismatched_groups_error() {
        assert!(bls12_381_add(&g1_generator(), &g2_generator()).is_err());
        assert!(bls12_381_pairing(&g2_generator(), &g1_generator()).is_err());
    }
}
