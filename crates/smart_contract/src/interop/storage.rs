//! `System.Storage.*` and `System.Iterator.*` services.

use super::{descriptor, InteropDescriptor};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_config::{MAX_STORAGE_KEY_SIZE, MAX_STORAGE_VALUE_SIZE};
use neo3_persistence::{SeekDirection, StorageKey};
use neo3_vm::StackItem;
use std::cell::RefCell;

/// Handle scoping storage access to one contract's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageContext {
    pub id: i32,
    pub read_only: bool,
}

/// Find option bits accepted by `System.Storage.Find`.
mod find_options {
    pub const KEYS_ONLY: u8 = 0x01;
    pub const REMOVE_PREFIX: u8 = 0x02;
    pub const VALUES_ONLY: u8 = 0x04;
    pub const BACKWARDS: u8 = 0x80;
    pub const ALL: u8 = KEYS_ONLY | REMOVE_PREFIX | VALUES_ONLY | BACKWARDS;
}

/// Iterator state surfaced as an interop handle.
pub struct StorageIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
    options: u8,
    prefix_len: usize,
}

pub(super) fn descriptors() -> Vec<InteropDescriptor> {
    vec![
        descriptor(
            "System.Storage.GetContext",
            1 << 4,
            CallFlags::READ_STATES,
            get_context,
        ),
        descriptor(
            "System.Storage.GetReadOnlyContext",
            1 << 4,
            CallFlags::READ_STATES,
            get_read_only_context,
        ),
        descriptor(
            "System.Storage.AsReadOnly",
            1 << 4,
            CallFlags::READ_STATES,
            as_read_only,
        ),
        descriptor("System.Storage.Get", 1 << 15, CallFlags::READ_STATES, get),
        descriptor("System.Storage.Put", 1 << 15, CallFlags::WRITE_STATES, put),
        descriptor(
            "System.Storage.Delete",
            1 << 15,
            CallFlags::WRITE_STATES,
            delete,
        ),
        descriptor("System.Storage.Find", 1 << 15, CallFlags::READ_STATES, find),
        descriptor("System.Iterator.Next", 1 << 15, CallFlags::NONE, iterator_next),
        descriptor("System.Iterator.Value", 1 << 4, CallFlags::NONE, iterator_value),
    ]
}

/// The contract id of the currently executing contract, required for any
/// storage access. Native contracts use their fixed negative ids.
fn current_contract_id(engine: &ApplicationEngine) -> ContractResult<i32> {
    let hash = engine.current_script_hash()?;
    if let Some(native) = engine.natives().by_hash(&hash) {
        return Ok(native.id());
    }
    let contract = crate::native::contract_management::get_contract(engine.snapshot(), &hash)?
        .ok_or_else(|| {
            ContractError::invalid_operation("storage access outside a deployed contract")
        })?;
    Ok(contract.id)
}

fn push_context(engine: &mut ApplicationEngine, read_only: bool) -> ContractResult<()> {
    let id = current_contract_id(engine)?;
    engine.push(StackItem::interop(
        "StorageContext",
        Box::new(StorageContext { id, read_only }),
    ))
}

fn get_context(engine: &mut ApplicationEngine) -> ContractResult<()> {
    push_context(engine, false)
}

fn get_read_only_context(engine: &mut ApplicationEngine) -> ContractResult<()> {
    push_context(engine, true)
}

fn pop_storage_context(engine: &mut ApplicationEngine) -> ContractResult<StorageContext> {
    let interop = engine.pop()?.as_interop()?;
    interop
        .value
        .downcast_ref::<StorageContext>()
        .copied()
        .ok_or_else(|| ContractError::invalid_argument("expected a storage context"))
}

fn as_read_only(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let mut context = pop_storage_context(engine)?;
    context.read_only = true;
    engine.push(StackItem::interop("StorageContext", Box::new(context)))
}

fn get(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let key = engine.pop_bytes()?;
    let context = pop_storage_context(engine)?;
    let store_key = StorageKey::new(context.id, key).to_store_key();
    match engine.snapshot().get(&store_key) {
        Some(value) => engine.push(StackItem::from_bytes(value)),
        None => engine.push(StackItem::Null),
    }
}

fn put(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let value = engine.pop_bytes()?;
    let key = engine.pop_bytes()?;
    let context = pop_storage_context(engine)?;
    if context.read_only {
        return Err(ContractError::invalid_operation(
            "write through a read-only storage context",
        ));
    }
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(ContractError::invalid_argument(format!(
            "storage key of {} bytes",
            key.len()
        )));
    }
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(ContractError::invalid_argument(format!(
            "storage value of {} bytes",
            value.len()
        )));
    }
    // Storage rent: charged per byte at the policy's storage price.
    let storage_price = engine.storage_price() as i64;
    engine.add_gas((key.len() + value.len()) as i64 * storage_price)?;
    let store_key = StorageKey::new(context.id, key).to_store_key();
    engine.snapshot().put(store_key, value);
    Ok(())
}

fn delete(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let key = engine.pop_bytes()?;
    let context = pop_storage_context(engine)?;
    if context.read_only {
        return Err(ContractError::invalid_operation(
            "delete through a read-only storage context",
        ));
    }
    let store_key = StorageKey::new(context.id, key).to_store_key();
    engine.snapshot().delete(store_key);
    Ok(())
}

fn find(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let options = engine.pop_int()?;
    let options = u8::try_from(&options)
        .map_err(|_| ContractError::invalid_argument(format!("find options {options}")))?;
    if options & !find_options::ALL != 0 {
        return Err(ContractError::invalid_argument(format!(
            "undefined find option bits {options:#04x}"
        )));
    }
    let prefix = engine.pop_bytes()?;
    let context = pop_storage_context(engine)?;
    let full_prefix = {
        let mut bytes = StorageKey::contract_prefix(context.id);
        bytes.extend_from_slice(&prefix);
        bytes
    };
    let direction = if options & find_options::BACKWARDS != 0 {
        SeekDirection::Backward
    } else {
        SeekDirection::Forward
    };
    let contract_prefix_len = StorageKey::contract_prefix(context.id).len();
    let entries: Vec<(Vec<u8>, Vec<u8>)> = engine
        .snapshot()
        .seek(&full_prefix, direction)
        .into_iter()
        .map(|(key, value)| (key[contract_prefix_len..].to_vec(), value))
        .collect();
    let prefix_len = if options & find_options::REMOVE_PREFIX != 0 {
        prefix.len()
    } else {
        0
    };
    engine.push(StackItem::interop(
        "StorageIterator",
        Box::new(RefCell::new(StorageIterator {
            entries,
            position: None,
            options,
            prefix_len,
        })),
    ))
}

fn with_iterator<T>(
    engine: &mut ApplicationEngine,
    f: impl FnOnce(&mut StorageIterator) -> ContractResult<T>,
) -> ContractResult<T> {
    let interop = engine.pop()?.as_interop()?;
    let cell = interop
        .value
        .downcast_ref::<RefCell<StorageIterator>>()
        .ok_or_else(|| ContractError::invalid_argument("expected an iterator"))?;
    let mut iterator = cell.borrow_mut();
    f(&mut iterator)
}

fn iterator_next(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let has_next = with_iterator(engine, |iterator| {
        let next = iterator.position.map_or(0, |p| p + 1);
        if next < iterator.entries.len() {
            iterator.position = Some(next);
            Ok(true)
        } else {
            iterator.position = Some(iterator.entries.len());
            Ok(false)
        }
    })?;
    engine.push(StackItem::from_bool(has_next))
}

fn iterator_value(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let item = with_iterator(engine, |iterator| {
        let position = iterator
            .position
            .filter(|&p| p < iterator.entries.len())
            .ok_or_else(|| ContractError::invalid_operation("iterator before first entry"))?;
        let (key, value) = &iterator.entries[position];
        let key = key[iterator.prefix_len.min(key.len())..].to_vec();
        let item = if iterator.options & find_options::KEYS_ONLY != 0 {
            StackItem::from_bytes(key)
        } else if iterator.options & find_options::VALUES_ONLY != 0 {
            StackItem::from_bytes(value.clone())
        } else {
            StackItem::struct_(vec![
                StackItem::from_bytes(key),
                StackItem::from_bytes(value.clone()),
            ])
        };
        Ok(item)
    })?;
    engine.push(item)
}
