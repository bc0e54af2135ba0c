//! Native contracts: protocol services implemented in the node binary and
//! invoked through the same call path as deployed contracts.

pub mod contract_management;
pub mod crypto_lib;
pub mod fungible_token;
pub mod gas_token;
pub mod ledger_contract;
pub mod neo_token;
pub mod oracle_contract;
pub mod policy_contract;
pub mod role_management;
pub mod std_lib;

use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::ContractResult;
use crate::interop;
use neo3_core::UInt160;
use neo3_persistence::{DataCache, StorageKey};
use neo3_vm::{ScriptBuilder, StackItem};
use num_bigint::BigInt;
use std::sync::Arc;

pub use contract_management::ContractManagement;
pub use crypto_lib::CryptoLib;
pub use gas_token::GasToken;
pub use ledger_contract::LedgerContract;
pub use neo_token::NeoToken;
pub use oracle_contract::OracleContract;
pub use policy_contract::PolicyContract;
pub use role_management::RoleManagement;
pub use std_lib::StdLib;

/// A native method: name, flat price in gas fractions, flags it requires
/// of the caller, and whether it pushes a return value.
#[derive(Debug, Clone, Copy)]
pub struct NativeMethod {
    pub name: &'static str,
    pub price: i64,
    pub required_flags: CallFlags,
    pub has_return: bool,
}

impl NativeMethod {
    pub const fn safe(name: &'static str, price: i64) -> Self {
        Self {
            name,
            price,
            required_flags: CallFlags::READ_STATES,
            has_return: true,
        }
    }

    pub const fn state_changing(name: &'static str, price: i64, has_return: bool) -> Self {
        Self {
            name,
            price,
            required_flags: CallFlags::STATES,
            has_return,
        }
    }
}

/// A contract whose implementation lives in the node binary.
pub trait NativeContract: Send + Sync {
    /// The fixed negative contract id.
    fn id(&self) -> i32;

    fn name(&self) -> &'static str;

    fn hash(&self) -> UInt160 {
        native_hash(self.id(), self.name())
    }

    fn methods(&self) -> &'static [NativeMethod];

    fn method(&self, name: &str) -> Option<&'static NativeMethod> {
        self.methods().iter().find(|m| m.name == name)
    }

    /// Dispatches `method` with `args`; the registry has already charged
    /// the price and checked flags.
    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: &[StackItem],
    ) -> ContractResult<StackItem>;

    /// Runs once, at genesis.
    fn initialize(&self, _engine: &mut ApplicationEngine) -> ContractResult<()> {
        Ok(())
    }

    /// Runs before every block's transactions, in registry order.
    fn on_persist(&self, _engine: &mut ApplicationEngine) -> ContractResult<()> {
        Ok(())
    }

    /// Runs after every block's transactions, in reverse registry order.
    fn post_persist(&self, _engine: &mut ApplicationEngine) -> ContractResult<()> {
        Ok(())
    }
}

/// The script hash of a native: the hash of its stub script, which pushes
/// the native id and enters `System.Contract.CallNative`.
pub fn native_hash(id: i32, _name: &str) -> UInt160 {
    UInt160::from_script(&native_stub_script(id))
}

/// The stub script stored for a native contract.
pub fn native_stub_script(id: i32) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(id as i64).expect("small id");
    builder.emit_syscall(interop::interop_id("System.Contract.CallNative"));
    builder.to_bytes()
}

/// All native contracts in their fixed persistence order.
pub struct NativeRegistry {
    contracts: Vec<Arc<dyn NativeContract>>,
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self {
            contracts: vec![
                Arc::new(ContractManagement),
                Arc::new(StdLib),
                Arc::new(CryptoLib),
                Arc::new(LedgerContract),
                Arc::new(NeoToken),
                Arc::new(GasToken),
                Arc::new(PolicyContract),
                Arc::new(RoleManagement),
                Arc::new(OracleContract),
            ],
        }
    }

    pub fn by_hash(&self, hash: &UInt160) -> Option<Arc<dyn NativeContract>> {
        self.contracts
            .iter()
            .find(|c| c.hash() == *hash)
            .map(Arc::clone)
    }

    pub fn by_id(&self, id: i32) -> Option<Arc<dyn NativeContract>> {
        self.contracts
            .iter()
            .find(|c| c.id() == id)
            .map(Arc::clone)
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn NativeContract>> {
        self.contracts
            .iter()
            .find(|c| c.name() == name)
            .map(Arc::clone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NativeContract>> {
        self.contracts.iter()
    }

    fn run_hook(
        engine: &mut ApplicationEngine,
        contract: &Arc<dyn NativeContract>,
        hook: fn(&dyn NativeContract, &mut ApplicationEngine) -> ContractResult<()>,
    ) -> ContractResult<()> {
        // Each hook runs under the native's own frame so notifications and
        // storage scoping attribute to it.
        engine.push_native_frame(contract.hash());
        let result = hook(contract.as_ref(), engine);
        engine.pop_frame();
        result
    }

    /// Genesis initialization, once per chain.
    pub fn initialize_all(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        for contract in &self.contracts {
            Self::run_hook(engine, contract, |c, e| c.initialize(e))?;
        }
        Ok(())
    }

    /// The pre-transaction per-block hook, fixed order.
    pub fn on_persist_all(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        for contract in &self.contracts {
            Self::run_hook(engine, contract, |c, e| c.on_persist(e))?;
        }
        Ok(())
    }

    /// The post-transaction per-block hook, reverse order.
    pub fn post_persist_all(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        for contract in self.contracts.iter().rev() {
            Self::run_hook(engine, contract, |c, e| c.post_persist(e))?;
        }
        Ok(())
    }
}

// ---- storage helpers shared by the natives ----

pub(crate) fn storage_key(id: i32, prefix: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + suffix.len());
    key.push(prefix);
    key.extend_from_slice(suffix);
    StorageKey::new(id, key).to_store_key()
}

pub(crate) fn get_bytes(snapshot: &DataCache, id: i32, prefix: u8, suffix: &[u8]) -> Option<Vec<u8>> {
    snapshot.get(&storage_key(id, prefix, suffix))
}

pub(crate) fn put_bytes(
    snapshot: &DataCache,
    id: i32,
    prefix: u8,
    suffix: &[u8],
    value: Vec<u8>,
) {
    snapshot.put(storage_key(id, prefix, suffix), value);
}

pub(crate) fn delete_key(snapshot: &DataCache, id: i32, prefix: u8, suffix: &[u8]) {
    snapshot.delete(storage_key(id, prefix, suffix));
}

pub(crate) fn get_int(snapshot: &DataCache, id: i32, prefix: u8, suffix: &[u8]) -> BigInt {
    get_bytes(snapshot, id, prefix, suffix)
        .map(|bytes| BigInt::from_signed_bytes_le(&bytes))
        .unwrap_or_default()
}

pub(crate) fn put_int(snapshot: &DataCache, id: i32, prefix: u8, suffix: &[u8], value: &BigInt) {
    put_bytes(snapshot, id, prefix, suffix, value.to_signed_bytes_le());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_ids_are_negative_and_unique() {
        let registry = NativeRegistry::new();
        let mut ids: Vec<i32> = registry.iter().map(|c| c.id()).collect();
        assert!(ids.iter().all(|&id| id < 0));
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 9);
    }

    #[test]
    fn hashes_are_stable() {
        let registry = NativeRegistry::new();
        for contract in registry.iter() {
            assert_eq!(contract.hash(), native_hash(contract.id(), contract.name()));
            assert!(registry.by_hash(&contract.hash()).is_some());
        }
    }
}
