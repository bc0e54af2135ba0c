//! Cryptographic services exposed to contracts.

use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::error::{ContractError, ContractResult};
use neo3_cryptography::{
    bls12_381_add, bls12_381_deserialize, bls12_381_mul, bls12_381_pairing, bls12_381_serialize,
    keccak256, ripemd160, sha256, verify_signature, BlsPoint, ECPoint,
};
use neo3_vm::StackItem;

/// Contract id of the crypto library.
pub const CRYPTO_LIB_ID: i32 = -3;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("sha256", 1 << 15),
    NativeMethod::safe("ripemd160", 1 << 15),
    NativeMethod::safe("keccak256", 1 << 15),
    NativeMethod::safe("verifyWithECDsa", 1 << 15),
    NativeMethod::safe("bls12381Serialize", 1 << 19),
    NativeMethod::safe("bls12381Deserialize", 1 << 19),
    NativeMethod::safe("bls12381Add", 1 << 19),
    NativeMethod::safe("bls12381Mul", 1 << 21),
    NativeMethod::safe("bls12381Pairing", 1 << 23),
];

fn arg_bytes(args: &[StackItem], index: usize) -> ContractResult<Vec<u8>> {
    Ok(args
        .get(index)
        .ok_or_else(|| ContractError::invalid_argument("missing argument"))?
        .as_bytes()?)
}

fn arg_bls(args: &[StackItem], index: usize) -> ContractResult<BlsPoint> {
    let interop = args
        .get(index)
        .ok_or_else(|| ContractError::invalid_argument("missing point"))?
        .as_interop()?;
    interop
        .value
        .downcast_ref::<BlsPoint>()
        .cloned()
        .ok_or_else(|| ContractError::invalid_argument("expected a BLS point"))
}

fn bls_item(point: BlsPoint) -> StackItem {
    StackItem::interop("Bls12381Point", Box::new(point))
}

/// The crypto-library native contract.
pub struct CryptoLib;

impl NativeContract for CryptoLib {
    fn id(&self) -> i32 {
        CRYPTO_LIB_ID
    }

    fn name(&self) -> &'static str {
        "CryptoLib"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        _engine: &mut ApplicationEngine,
        method: &str,
        args: &[StackItem],
    ) -> ContractResult<StackItem> {
        match method {
            "sha256" => Ok(StackItem::from_bytes(
                sha256(&arg_bytes(args, 0)?).to_vec(),
            )),
            "ripemd160" => Ok(StackItem::from_bytes(
                ripemd160(&arg_bytes(args, 0)?).to_vec(),
            )),
            "keccak256" => Ok(StackItem::from_bytes(
                keccak256(&arg_bytes(args, 0)?).to_vec(),
            )),
            "verifyWithECDsa" => {
                let message = arg_bytes(args, 0)?;
                let key_bytes = arg_bytes(args, 1)?;
                let signature = arg_bytes(args, 2)?;
                let result = match ECPoint::decode(&key_bytes) {
                    Ok(key) => verify_signature(&message, &signature, &key),
                    Err(_) => false,
                };
                Ok(StackItem::from_bool(result))
            }
            "bls12381Serialize" => {
                let point = arg_bls(args, 0)?;
                let bytes = bls12_381_serialize(&point)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(StackItem::from_bytes(bytes))
            }
            "bls12381Deserialize" => {
                let bytes = arg_bytes(args, 0)?;
                let point = bls12_381_deserialize(&bytes)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(bls_item(point))
            }
            "bls12381Add" => {
                let a = arg_bls(args, 0)?;
                let b = arg_bls(args, 1)?;
                let sum = bls12_381_add(&a, &b)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(bls_item(sum))
            }
            "bls12381Mul" => {
                let point = arg_bls(args, 0)?;
                let scalar = arg_bytes(args, 1)?;
                let negate = args
                    .get(2)
                    .ok_or_else(|| ContractError::invalid_argument("missing negate flag"))?
                    .as_bool()?;
                let product = bls12_381_mul(&point, &scalar, negate)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(bls_item(product))
            }
            "bls12381Pairing" => {
                let g1 = arg_bls(args, 0)?;
                let g2 = arg_bls(args, 1)?;
                let gt = bls12_381_pairing(&g1, &g2)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(bls_item(gt))
            }
            other => Err(ContractError::contract_not_found(format!(
                "CryptoLib::{other}"
            ))),
        }
    }
}
