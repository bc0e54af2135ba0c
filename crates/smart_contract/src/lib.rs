//! Smart-contract execution.
//!
//! [`ApplicationEngine`] wraps the VM with gas metering, the system-call
//! table and a storage snapshot; the native contracts implement the
//! protocol's built-in services on top of it.

mod application_engine;
mod binary_serializer;
mod call_flags;
mod contract;
mod contract_state;
mod error;
pub mod interop;
mod manifest;
pub mod native;
mod trigger;

pub use application_engine::{ApplicationEngine, LogEntry, NotificationEvent};
pub use binary_serializer::{deserialize_item, serialize_item};
pub use call_flags::CallFlags;
pub use contract::{
    create_multisig_redeem_script, create_signature_redeem_script, next_consensus_address,
    verify_witness,
};
pub use contract_state::{AppExecResult, ContractState, MethodToken, NefFile};
pub use error::{ContractError, ContractResult};
pub use manifest::{ContractAbi, ContractManifest, ContractMethod, ContractPermission};
pub use trigger::TriggerType;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use neo3_persistence::{DataCache, MemoryStore};
    use std::sync::Arc;

    /// A throwaway engine over an empty in-memory snapshot.
    pub fn application_engine() -> ApplicationEngine {
        ApplicationEngine::new(
            TriggerType::Application,
            None,
            Arc::new(DataCache::from_store(&MemoryStore::new())),
            None,
            neo3_config::ProtocolSettings::default_private(),
            i64::MAX,
        )
    }
}
