//! `System.Contract.*` services.

use super::{descriptor, InteropDescriptor};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::contract::{create_multisig_redeem_script, create_signature_redeem_script_from_bytes};
use crate::error::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_cryptography::ECPoint;
use neo3_vm::StackItem;

pub(super) fn descriptors() -> Vec<InteropDescriptor> {
    vec![
        descriptor(
            "System.Contract.Call",
            1 << 15,
            CallFlags::ALLOW_CALL,
            call,
        ),
        descriptor(
            "System.Contract.CallNative",
            0,
            CallFlags::NONE,
            call_native,
        ),
        descriptor(
            "System.Contract.GetCallFlags",
            1 << 10,
            CallFlags::NONE,
            get_call_flags,
        ),
        descriptor(
            "System.Contract.CreateStandardAccount",
            1 << 8,
            CallFlags::NONE,
            create_standard_account,
        ),
        descriptor(
            "System.Contract.CreateMultisigAccount",
            1 << 8,
            CallFlags::NONE,
            create_multisig_account,
        ),
    ]
}

fn call(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let arguments_item = engine.pop()?;
    let flags = engine.pop_int()?;
    let method = engine.pop_bytes()?;
    let hash = engine.pop_u160()?;

    let flags = u8::try_from(&flags)
        .ok()
        .and_then(CallFlags::from_bits)
        .ok_or_else(|| ContractError::invalid_argument("call flags"))?;
    let method = String::from_utf8(method)
        .map_err(|_| ContractError::invalid_argument("method name is not UTF-8"))?;
    let arguments = arguments_item.as_array()?.borrow().clone();
    engine.call_contract(hash, &method, flags, arguments)
}

/// Entry point of every native stub script: dispatches the version-checked
/// native call. The method name and arguments are read from the stack.
fn call_native(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let id = engine.pop_int()?;
    let id = i32::try_from(&id)
        .map_err(|_| ContractError::invalid_argument(format!("native id {id}")))?;
    let natives = engine.natives();
    let native = natives
        .by_id(id)
        .ok_or_else(|| ContractError::contract_not_found(format!("native {id}")))?;
    let method = engine.pop_bytes()?;
    let method = String::from_utf8(method)
        .map_err(|_| ContractError::invalid_argument("method name is not UTF-8"))?;
    let arguments = engine.pop()?.as_array()?.borrow().clone();

    let method_info = native
        .method(&method)
        .ok_or_else(|| ContractError::contract_not_found(format!("{}::{method}", native.name())))?;
    engine.check_call_flags(method_info.required_flags)?;
    engine.add_gas(method_info.price)?;
    let result = native.invoke(engine, &method, &arguments)?;
    if method_info.has_return {
        engine.push(result)?;
    }
    Ok(())
}

fn get_call_flags(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let flags = engine.current_call_flags().bits();
    engine.push(StackItem::from_int(flags))
}

fn create_standard_account(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let key_bytes = engine.pop_bytes()?;
    let script = create_signature_redeem_script_from_bytes(&key_bytes)?;
    let hash = UInt160::from_script(&script);
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

fn create_multisig_account(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let keys_item = engine.pop()?;
    let m = engine.pop_int()?;
    let m = usize::try_from(&m)
        .map_err(|_| ContractError::invalid_argument(format!("threshold {m}")))?;
    let keys: Vec<ECPoint> = keys_item
        .as_array()?
        .borrow()
        .iter()
        .map(|item| {
            let bytes = item.as_bytes()?;
            ECPoint::decode(&bytes)
                .map_err(|e| ContractError::invalid_argument(e.to_string()))
        })
        .collect::<ContractResult<_>>()?;
    let script = create_multisig_redeem_script(m, &keys)?;
    let hash = UInt160::from_script(&script);
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}
