//! Cryptographic primitives.
//!
//! Hashing, Base58Check, Merkle roots, secp256r1 ECDSA and the BLS12-381
//! group operations exposed by the CryptoLib native contract. Verification
//! helpers return `false` on bad input rather than erroring; only key and
//! point decoding surface a [`CryptoError`].

mod base58;
mod bls;
mod ecdsa;
mod error;
pub mod hash;
mod merkle_tree;

pub use base58::{base58check_decode, base58check_encode};
pub use bls::{bls12_381_add, bls12_381_deserialize, bls12_381_mul, bls12_381_pairing,
    bls12_381_serialize, BlsPoint};
pub use ecdsa::{sign, verify_signature, ECPoint, KeyPair};
pub use error::{CryptoError, CryptoResult};
pub use hash::{hash160, hash256, keccak256, ripemd160, sha256};
pub use merkle_tree::MerkleTree;
