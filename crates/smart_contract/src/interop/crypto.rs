//! `System.Crypto.*` services.

use super::{descriptor, InteropDescriptor};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_cryptography::{verify_signature, ECPoint};
use neo3_vm::StackItem;

/// Fee units for one signature verification.
pub const CHECKSIG_UNITS: i64 = 1 << 15;

pub(super) fn descriptors() -> Vec<InteropDescriptor> {
    vec![
        descriptor(
            "System.Crypto.CheckSig",
            CHECKSIG_UNITS,
            CallFlags::NONE,
            check_sig,
        ),
        descriptor(
            "System.Crypto.CheckMultisig",
            0,
            CallFlags::NONE,
            check_multisig,
        ),
    ]
}

/// The message signed by witnesses: network magic followed by the
/// container hash, or the engine's explicit override.
fn sign_data(engine: &ApplicationEngine) -> ContractResult<Vec<u8>> {
    engine.sign_data()
}

fn check_sig(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let signature = engine.pop_bytes()?;
    let key_bytes = engine.pop_bytes()?;
    let message = sign_data(engine)?;
    let result = match ECPoint::decode(&key_bytes) {
        Ok(key) => verify_signature(&message, &signature, &key),
        Err(_) => false,
    };
    engine.push(StackItem::from_bool(result))
}

/// Pops the flat multisig layout left by the standard redeem script and
/// its invocation script: `sig_1 .. sig_m  m  key_1 .. key_n  n`.
fn check_multisig(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let n = engine.pop_int()?;
    let n = usize::try_from(&n)
        .map_err(|_| ContractError::invalid_argument(format!("key count {n}")))?;
    if n == 0 || n > 1024 {
        return Err(ContractError::invalid_argument(format!("key count {n}")));
    }
    let mut keys: Vec<Vec<u8>> = Vec::with_capacity(n);
    for _ in 0..n {
        keys.push(engine.pop_bytes()?);
    }
    keys.reverse();
    let m = engine.pop_int()?;
    let m = usize::try_from(&m)
        .map_err(|_| ContractError::invalid_argument(format!("threshold {m}")))?;
    let mut signatures: Vec<Vec<u8>> = Vec::with_capacity(m);
    for _ in 0..m {
        signatures.push(engine.pop_bytes()?);
    }
    signatures.reverse();
    if signatures.is_empty() || keys.len() < signatures.len() {
        return Err(ContractError::invalid_argument(format!(
            "{} signatures against {} keys",
            signatures.len(),
            keys.len()
        )));
    }
    engine.charge_units(CHECKSIG_UNITS * keys.len() as i64)?;
    let message = sign_data(engine)?;

    // Signatures must match keys in order; one pass over both.
    let mut key_index = 0usize;
    let mut matched = 0usize;
    for signature in &signatures {
        let mut found = false;
        while key_index < keys.len() {
            let key = &keys[key_index];
            key_index += 1;
            if let Ok(point) = ECPoint::decode(key) {
                if verify_signature(&message, signature, &point) {
                    found = true;
                    break;
                }
            }
        }
        if !found {
            break;
        }
        matched += 1;
    }
    engine.push(StackItem::from_bool(matched == signatures.len()))
}
