//! Standard verification contracts and witness execution.

use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use crate::interop;
use crate::trigger::TriggerType;
use neo3_config::{ProtocolSettings, MAX_VERIFICATION_GAS};
use neo3_core::{Transaction, UInt160, Witness};
use neo3_cryptography::ECPoint;
use neo3_persistence::DataCache;
use neo3_vm::{OpCode, ScriptBuilder, VMState};
use std::sync::Arc;

/// The single-signature verification script:
/// `PUSHDATA1 <key> SYSCALL System.Crypto.CheckSig`.
pub fn create_signature_redeem_script(key: &ECPoint) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_bytes(key.encoded())
        .expect("33-byte key always fits");
    builder.emit_syscall(interop::interop_id("System.Crypto.CheckSig"));
    builder.to_bytes()
}

/// Same as [`create_signature_redeem_script`] from raw key bytes.
pub fn create_signature_redeem_script_from_bytes(key: &[u8]) -> ContractResult<Vec<u8>> {
    let key =
        ECPoint::decode(key).map_err(|e| ContractError::invalid_argument(e.to_string()))?;
    Ok(create_signature_redeem_script(&key))
}

/// The m-of-n multisig verification script: the threshold, the sorted
/// keys and the key count, ending in `System.Crypto.CheckMultisig`.
pub fn create_multisig_redeem_script(m: usize, keys: &[ECPoint]) -> ContractResult<Vec<u8>> {
    if m == 0 || m > keys.len() || keys.is_empty() || keys.len() > 1024 {
        return Err(ContractError::invalid_argument(format!(
            "{m}-of-{} multisig",
            keys.len()
        )));
    }
    let mut sorted: Vec<&ECPoint> = keys.iter().collect();
    sorted.sort();
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_int(m as i64)
        .map_err(ContractError::from)?;
    for key in sorted {
        builder
            .emit_push_bytes(key.encoded())
            .map_err(ContractError::from)?;
    }
    builder
        .emit_push_int(keys.len() as i64)
        .map_err(ContractError::from)?;
    builder.emit_syscall(interop::interop_id("System.Crypto.CheckMultisig"));
    Ok(builder.to_bytes())
}

/// The script hash validators commit to as `next_consensus`: the m-of-n
/// multisig contract over the validator keys with `m = n - f`.
pub fn next_consensus_address(validators: &[ECPoint]) -> ContractResult<UInt160> {
    let m = validators.len() - (validators.len() - 1) / 3;
    let script = create_multisig_redeem_script(m, validators)?;
    Ok(UInt160::from_script(&script))
}

/// Whether a script consists solely of data pushes.
fn is_push_only(script: &[u8]) -> bool {
    let mut position = 0;
    while position < script.len() {
        match neo3_vm::Instruction::parse(script, position) {
            Ok(instruction) => {
                if instruction.opcode as u8 > OpCode::PUSH16 as u8 {
                    return false;
                }
                position = instruction.next_position();
            }
            Err(_) => return false,
        }
    }
    true
}

/// Runs a witness: the invocation script supplies the signatures, the
/// verification script consumes them. Passes when the engine halts with
/// exactly one truthy item and within the verification gas ceiling.
pub fn verify_witness(
    settings: &ProtocolSettings,
    snapshot: Arc<DataCache>,
    container: Option<Transaction>,
    sign_data: Vec<u8>,
    expected_hash: &UInt160,
    witness: &Witness,
    gas_limit: i64,
) -> bool {
    if witness.verification_script.is_empty() {
        return false;
    }
    if witness.script_hash() != *expected_hash {
        return false;
    }
    if !witness.invocation_script.is_empty() && !is_push_only(&witness.invocation_script) {
        return false;
    }
    let mut engine = ApplicationEngine::new(
        TriggerType::Verification,
        container,
        snapshot,
        None,
        settings.clone(),
        gas_limit.min(MAX_VERIFICATION_GAS),
    );
    engine.set_sign_data(sign_data);
    if engine
        .load_script(witness.verification_script.clone(), CallFlags::READ_ONLY, 1)
        .is_err()
    {
        return false;
    }
    if !witness.invocation_script.is_empty()
        && engine
            .load_script(witness.invocation_script.clone(), CallFlags::NONE, -1)
            .is_err()
    {
        return false;
    }
    if engine.execute() != VMState::Halt {
        return false;
    }
    let result = engine.result_stack();
    result.len() == 1 && result[0].as_bool().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_cryptography::KeyPair;
    use neo3_persistence::MemoryStore;

    fn snapshot() -> Arc<DataCache> {
        Arc::new(DataCache::from_store(&MemoryStore::new()))
    }

    fn signed_tx(pair: &KeyPair, settings: &ProtocolSettings) -> (Transaction, Witness) {
        let verification = create_signature_redeem_script(pair.public_key());
        let account = UInt160::from_script(&verification);
        let mut tx = Transaction {
            version: 0,
            nonce: 1,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 100,
            signers: vec![neo3_core::Signer::called_by_entry(account)],
            attributes: vec![],
            script: vec![OpCode::RET as u8],
            witnesses: vec![],
        };
        let signature = pair.sign(&tx.sign_data(settings.network));
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(&signature).unwrap();
        let witness = Witness::new(builder.to_bytes(), verification);
        tx.witnesses = vec![witness.clone()];
        (tx, witness)
    }

    #[test]
    fn valid_single_signature_witness_passes() {
        let settings = ProtocolSettings::default_private();
        let pair = KeyPair::generate();
        let (tx, witness) = signed_tx(&pair, &settings);
        let sign_data = tx.sign_data(settings.network);
        let account = witness.script_hash();
        assert!(verify_witness(
            &settings,
            snapshot(),
            Some(tx),
            sign_data,
            &account,
            &witness,
            MAX_VERIFICATION_GAS,
        ));
    }

    #[test]
    fn wrong_network_magic_fails() {
        let settings = ProtocolSettings::default_private();
        let pair = KeyPair::generate();
        let (tx, witness) = signed_tx(&pair, &settings);
        let account = witness.script_hash();
        // Signature was produced for the private net; verify against MainNet.
        let mainnet = ProtocolSettings::mainnet();
        let sign_data = tx.sign_data(mainnet.network);
        assert!(!verify_witness(
            &mainnet,
            snapshot(),
            Some(tx),
            sign_data,
            &account,
            &witness,
            MAX_VERIFICATION_GAS,
        ));
    }

    #[test]
    fn witness_hash_must_match_expected() {
        let settings = ProtocolSettings::default_private();
        let pair = KeyPair::generate();
        let (tx, witness) = signed_tx(&pair, &settings);
        let sign_data = tx.sign_data(settings.network);
        let wrong = UInt160::from_script(b"someone else");
        assert!(!verify_witness(
            &settings,
            snapshot(),
            Some(tx),
            sign_data,
            &wrong,
            &witness,
            MAX_VERIFICATION_GAS,
        ));
    }

    #[test]
    fn multisig_script_orders_keys() {
        let keys: Vec<ECPoint> = (0..4).map(|_| *KeyPair::generate().public_key()).collect();
        let mut shuffled = keys.clone();
        shuffled.reverse();
        let a = create_multisig_redeem_script(3, &keys).unwrap();
        let b = create_multisig_redeem_script(3, &shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invocation_script_must_be_push_only() {
        let settings = ProtocolSettings::default_private();
        let pair = KeyPair::generate();
        let (tx, mut witness) = signed_tx(&pair, &settings);
        let sign_data = tx.sign_data(settings.network);
        let account = witness.script_hash();
        witness.invocation_script.push(OpCode::ABORT as u8);
        assert!(!verify_witness(
            &settings,
            snapshot(),
            Some(tx),
            sign_data,
            &account,
            &witness,
            MAX_VERIFICATION_GAS,
        ));
    }
}
