//! The system-call table.
//!
//! Syscalls are identified by the first four little-endian bytes of the
//! SHA-256 of their dotted name. Each descriptor declares a fixed price
//! (in fee units, scaled by the execution fee factor) and the call flags
//! the invoking context must hold.

mod contract;
mod crypto;
mod runtime;
mod storage;

use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_cryptography::sha256;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A registered system call.
pub struct InteropDescriptor {
    pub name: &'static str,
    pub id: u32,
    /// Price in fee units; handlers may charge more (storage writes).
    pub price_units: i64,
    pub required_flags: CallFlags,
    pub handler: fn(&mut ApplicationEngine) -> ContractResult<()>,
}

/// The id of a syscall name.
pub fn interop_id(name: &str) -> u32 {
    let digest = sha256(name.as_bytes());
    u32::from_le_bytes(digest[..4].try_into().expect("4 bytes"))
}

pub(crate) fn descriptor(
    name: &'static str,
    price_units: i64,
    required_flags: CallFlags,
    handler: fn(&mut ApplicationEngine) -> ContractResult<()>,
) -> InteropDescriptor {
    InteropDescriptor {
        name,
        id: interop_id(name),
        price_units,
        required_flags,
        handler,
    }
}

static TABLE: Lazy<HashMap<u32, InteropDescriptor>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for descriptor in runtime::descriptors()
        .into_iter()
        .chain(storage::descriptors())
        .chain(contract::descriptors())
        .chain(crypto::descriptors())
    {
        let existing = table.insert(descriptor.id, descriptor);
        debug_assert!(existing.is_none(), "syscall id collision");
    }
    table
});

/// Looks up a descriptor by id.
pub fn find(id: u32) -> Option<&'static InteropDescriptor> {
    TABLE.get(&id)
}

/// Looks up a descriptor by name (tests, script builders).
pub fn find_by_name(name: &str) -> Option<&'static InteropDescriptor> {
    TABLE.get(&interop_id(name))
}

/// Dispatches `SYSCALL id` for the engine: flag check, price, handler.
pub fn dispatch(engine: &mut ApplicationEngine, id: u32) -> ContractResult<()> {
    let descriptor = find(id).ok_or(ContractError::UnknownSyscall { id })?;
    engine.check_call_flags(descriptor.required_flags)?;
    engine.charge_units(descriptor.price_units)?;
    (descriptor.handler)(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_unique() {
        let a = interop_id("System.Runtime.CheckWitness");
        let b = interop_id("System.Runtime.CheckWitness");
        assert_eq!(a, b);
        assert_ne!(a, interop_id("System.Runtime.Notify"));
    }

    #[test]
    fn core_syscalls_are_registered() {
        for name in [
            "System.Runtime.Platform",
            "System.Runtime.GetNetwork",
            "System.Runtime.GetAddressVersion",
            "System.Runtime.GetTrigger",
            "System.Runtime.GetTime",
            "System.Runtime.GetScriptContainer",
            "System.Runtime.GetExecutingScriptHash",
            "System.Runtime.GetCallingScriptHash",
            "System.Runtime.GetEntryScriptHash",
            "System.Runtime.GetInvocationCounter",
            "System.Runtime.GetRandom",
            "System.Runtime.GasLeft",
            "System.Runtime.BurnGas",
            "System.Runtime.CheckWitness",
            "System.Runtime.Log",
            "System.Runtime.Notify",
            "System.Storage.GetContext",
            "System.Storage.GetReadOnlyContext",
            "System.Storage.AsReadOnly",
            "System.Storage.Get",
            "System.Storage.Put",
            "System.Storage.Delete",
            "System.Storage.Find",
            "System.Iterator.Next",
            "System.Iterator.Value",
            "System.Contract.Call",
            "System.Contract.CallNative",
            "System.Contract.GetCallFlags",
            "System.Contract.CreateStandardAccount",
            "System.Contract.CreateMultisigAccount",
            "System.Crypto.CheckSig",
            "System.Crypto.CheckMultisig",
        ] {
            assert!(find_by_name(name).is_some(), "missing {name}");
        }
    }
}
