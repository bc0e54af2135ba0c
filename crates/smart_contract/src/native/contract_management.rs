//! Contract deployment, update and destruction.

use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::contract_state::{ContractState, NefFile};
use crate::error::{ContractError, ContractResult};
use crate::manifest::ContractManifest;
use neo3_core::UInt160;
use neo3_io::SerializableExt;
use neo3_persistence::DataCache;
use neo3_vm::StackItem;
use num_bigint::BigInt;

/// Contract id of contract management.
pub const MANAGEMENT_ID: i32 = -1;

const PREFIX_CONTRACT: u8 = 8;
const PREFIX_NEXT_ID: u8 = 15;

/// Base deployment fee: 10 GAS.
const DEPLOY_FEE: i64 = 10 * 100_000_000;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getContract", 1 << 15),
    NativeMethod::state_changing("deploy", 0, true),
    NativeMethod::state_changing("update", 0, false),
    NativeMethod::state_changing("destroy", 1 << 15, false),
];

/// Looks up a deployed contract by hash.
pub fn get_contract(
    snapshot: &DataCache,
    hash: &UInt160,
) -> ContractResult<Option<ContractState>> {
    match super::get_bytes(snapshot, MANAGEMENT_ID, PREFIX_CONTRACT, hash.as_bytes()) {
        Some(bytes) => Ok(Some(ContractState::from_storage_bytes(&bytes)?)),
        None => Ok(None),
    }
}

fn put_contract(snapshot: &DataCache, contract: &ContractState) {
    super::put_bytes(
        snapshot,
        MANAGEMENT_ID,
        PREFIX_CONTRACT,
        contract.hash.as_bytes(),
        contract.to_storage_bytes(),
    );
}

fn next_contract_id(snapshot: &DataCache) -> i32 {
    let next = super::get_int(snapshot, MANAGEMENT_ID, PREFIX_NEXT_ID, &[]);
    let id = i32::try_from(&next).unwrap_or(0).max(1);
    super::put_int(
        snapshot,
        MANAGEMENT_ID,
        PREFIX_NEXT_ID,
        &[],
        &BigInt::from(id + 1),
    );
    id
}

/// The contract-management native contract.
pub struct ContractManagement;

impl ContractManagement {
    fn parse_deploy_args(
        args: &[StackItem],
    ) -> ContractResult<(NefFile, ContractManifest)> {
        let nef_bytes = args
            .first()
            .ok_or_else(|| ContractError::invalid_argument("missing NEF"))?
            .as_bytes()?;
        let manifest_bytes = args
            .get(1)
            .ok_or_else(|| ContractError::invalid_argument("missing manifest"))?
            .as_bytes()?;
        if manifest_bytes.len() > crate::manifest::MAX_MANIFEST_SIZE {
            return Err(ContractError::invalid_argument("manifest too large"));
        }
        let nef = NefFile::from_array(&nef_bytes)
            .map_err(|e| ContractError::invalid_nef(e.to_string()))?;
        let manifest = ContractManifest::from_json_bytes(&manifest_bytes)
            .map_err(|e| ContractError::invalid_argument(format!("manifest: {e}")))?;
        if manifest.name.is_empty() {
            return Err(ContractError::invalid_argument("manifest name is empty"));
        }
        Ok((nef, manifest))
    }
}

impl NativeContract for ContractManagement {
    fn id(&self) -> i32 {
        MANAGEMENT_ID
    }

    fn name(&self) -> &'static str {
        "ContractManagement"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: &[StackItem],
    ) -> ContractResult<StackItem> {
        match method {
            "getContract" => {
                let bytes = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing hash"))?
                    .as_bytes()?;
                let hash = UInt160::from_bytes(&bytes)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                let snapshot = engine.snapshot().clone();
                Ok(match get_contract(&snapshot, &hash)? {
                    Some(contract) => contract_to_item(&contract),
                    None => StackItem::Null,
                })
            }
            "deploy" => {
                engine.add_gas(DEPLOY_FEE)?;
                let (nef, manifest) = Self::parse_deploy_args(args)?;
                let sender = engine
                    .container()
                    .map(|tx| tx.sender())
                    .ok_or_else(|| {
                        ContractError::invalid_operation("deploy outside a transaction")
                    })?;
                let hash = ContractState::compute_hash(&sender, nef.checksum, &manifest.name);
                let snapshot = engine.snapshot().clone();
                if get_contract(&snapshot, &hash)?.is_some() {
                    return Err(ContractError::invalid_operation(format!(
                        "contract {hash} already deployed"
                    )));
                }
                let contract = ContractState {
                    id: next_contract_id(&snapshot),
                    update_counter: 0,
                    hash,
                    nef,
                    manifest,
                };
                put_contract(&snapshot, &contract);
                engine.notify(
                    "Deploy".to_string(),
                    StackItem::array(vec![StackItem::from_bytes(
                        hash.to_array().to_vec(),
                    )]),
                )?;
                Ok(contract_to_item(&contract))
            }
            "update" => {
                engine.add_gas(DEPLOY_FEE)?;
                let (nef, manifest) = Self::parse_deploy_args(args)?;
                // A contract updates itself: the calling context is the
                // contract being replaced.
                let calling = engine
                    .calling_script_hash()
                    .ok_or_else(|| ContractError::invalid_operation("update without caller"))?;
                let snapshot = engine.snapshot().clone();
                let mut contract = get_contract(&snapshot, &calling)?.ok_or_else(|| {
                    ContractError::contract_not_found(format!("contract {calling}"))
                })?;
                contract.nef = nef;
                contract.manifest = manifest;
                contract.update_counter += 1;
                put_contract(&snapshot, &contract);
                engine.notify(
                    "Update".to_string(),
                    StackItem::array(vec![StackItem::from_bytes(
                        contract.hash.to_array().to_vec(),
                    )]),
                )?;
                Ok(StackItem::Null)
            }
            "destroy" => {
                let calling = engine
                    .calling_script_hash()
                    .ok_or_else(|| ContractError::invalid_operation("destroy without caller"))?;
                let snapshot = engine.snapshot().clone();
                let Some(contract) = get_contract(&snapshot, &calling)? else {
                    return Ok(StackItem::Null);
                };
                super::delete_key(
                    &snapshot,
                    MANAGEMENT_ID,
                    PREFIX_CONTRACT,
                    contract.hash.as_bytes(),
                );
                // Drop the contract's storage records with it.
                let prefix = neo3_persistence::StorageKey::contract_prefix(contract.id);
                for (key, _) in snapshot.seek(&prefix, neo3_persistence::SeekDirection::Forward)
                {
                    snapshot.delete(key);
                }
                engine.notify(
                    "Destroy".to_string(),
                    StackItem::array(vec![StackItem::from_bytes(
                        contract.hash.to_array().to_vec(),
                    )]),
                )?;
                Ok(StackItem::Null)
            }
            other => Err(ContractError::contract_not_found(format!(
                "ContractManagement::{other}"
            ))),
        }
    }
}

fn contract_to_item(contract: &ContractState) -> StackItem {
    StackItem::array(vec![
        StackItem::from_int(contract.id),
        StackItem::from_int(contract.update_counter),
        StackItem::from_bytes(contract.hash.to_array().to_vec()),
        StackItem::from_bytes(contract.nef.to_array()),
        StackItem::from_bytes(contract.manifest.to_json_bytes()),
    ])
}
