//! Role management: designated node lists per role.

use super::{neo_token, NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::error::{ContractError, ContractResult};
use neo3_cryptography::ECPoint;
use neo3_persistence::{DataCache, SeekDirection};
use neo3_vm::StackItem;

/// Contract id of role management.
pub const ROLE_MANAGEMENT_ID: i32 = -8;

/// Node roles with designated public-key sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    StateValidator = 4,
    Oracle = 8,
    NeoFsAlphabet = 16,
}

impl Role {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            4 => Some(Self::StateValidator),
            8 => Some(Self::Oracle),
            16 => Some(Self::NeoFsAlphabet),
            _ => None,
        }
    }
}

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getDesignatedByRole", 1 << 15),
    NativeMethod::state_changing("designateAsRole", 1 << 15, false),
];

/// Storage suffix: role byte then the designation height big-endian, so a
/// backward prefix scan finds the latest designation at or below a height.
fn role_key(role: Role, index: u32) -> Vec<u8> {
    let mut suffix = vec![role as u8];
    suffix.extend_from_slice(&index.to_be_bytes());
    suffix
}

/// The node list designated for `role` as of block `index`.
pub fn designated_by_role(
    snapshot: &DataCache,
    role: Role,
    index: u32,
) -> ContractResult<Vec<ECPoint>> {
    let prefix = super::storage_key(ROLE_MANAGEMENT_ID, 0, &[role as u8]);
    let entries = snapshot.seek(&prefix, SeekDirection::Backward);
    for (key, value) in entries {
        // Suffix layout: role byte then big-endian height.
        let height_bytes = &key[key.len() - 4..];
        let height = u32::from_be_bytes(height_bytes.try_into().expect("4 bytes"));
        if height <= index {
            return decode_nodes(&value);
        }
    }
    Ok(Vec::new())
}

fn decode_nodes(value: &[u8]) -> ContractResult<Vec<ECPoint>> {
    value
        .chunks(33)
        .map(|chunk| {
            ECPoint::decode(chunk).map_err(|e| ContractError::invalid_argument(e.to_string()))
        })
        .collect()
}

fn encode_nodes(nodes: &[ECPoint]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(nodes.len() * 33);
    for node in nodes {
        bytes.extend_from_slice(node.encoded());
    }
    bytes
}

/// The role-management native contract.
pub struct RoleManagement;

impl NativeContract for RoleManagement {
    fn id(&self) -> i32 {
        ROLE_MANAGEMENT_ID
    }

    fn name(&self) -> &'static str {
        "RoleManagement"
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
            "getDesignatedByRole" => {
                let role_byte = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing role"))?
                    .as_int()?;
                let role = u8::try_from(&role_byte)
                    .ok()
                    .and_then(Role::from_byte)
                    .ok_or_else(|| {
                        ContractError::invalid_argument(format!("role {role_byte}"))
                    })?;
                let index = args
                    .get(1)
                    .ok_or_else(|| ContractError::invalid_argument("missing index"))?
                    .as_int()?;
                let index = u32::try_from(&index)
                    .map_err(|_| ContractError::invalid_argument(format!("index {index}")))?;
                let nodes = designated_by_role(engine.snapshot(), role, index)?;
                Ok(StackItem::array(
                    nodes
                        .into_iter()
                        .map(|node| StackItem::from_bytes(node.to_bytes()))
                        .collect(),
                ))
            }
            "designateAsRole" => {
                let role_byte = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing role"))?
                    .as_int()?;
                let role = u8::try_from(&role_byte)
                    .ok()
                    .and_then(Role::from_byte)
                    .ok_or_else(|| {
                        ContractError::invalid_argument(format!("role {role_byte}"))
                    })?;
                let nodes_item = args
                    .get(1)
                    .ok_or_else(|| ContractError::invalid_argument("missing node list"))?;
                let nodes: Vec<ECPoint> = nodes_item
                    .as_array()?
                    .borrow()
                    .iter()
                    .map(|item| {
                        let bytes = item.as_bytes()?;
                        ECPoint::decode(&bytes)
                            .map_err(|e| ContractError::invalid_argument(e.to_string()))
                    })
                    .collect::<ContractResult<_>>()?;
                if nodes.is_empty() || nodes.len() > 32 {
                    return Err(ContractError::invalid_argument(format!(
                        "{} designated nodes",
                        nodes.len()
                    )));
                }
                if !neo_token::check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "designation requires the committee witness",
                    ));
                }
                let index = engine
                    .persisting_block()
                    .map(|b| b.header.index)
                    .ok_or_else(|| {
                        ContractError::invalid_operation("designation outside a block")
                    })?;
                let mut sorted = nodes;
                sorted.sort();
                let snapshot = engine.snapshot().clone();
                super::put_bytes(
                    &snapshot,
                    ROLE_MANAGEMENT_ID,
                    0,
                    &role_key(role, index + 1)[..],
                    encode_nodes(&sorted),
                );
                engine.notify(
                    "Designation".to_string(),
                    StackItem::array(vec![
                        StackItem::from_int(role as u8),
                        StackItem::from_int(index),
                    ]),
                )?;
                Ok(StackItem::Null)
            }
            other => Err(ContractError::contract_not_found(format!(
                "RoleManagement::{other}"
            ))),
        }
    }
}
